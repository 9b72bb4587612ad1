/*
  Copyright (c) 2018-present evan GmbH.

  Licensed under the Apache License, Version 2.0 (the "License");
  you may not use this file except in compliance with the License.
  You may obtain a copy of the License at

      http://www.apache.org/licenses/LICENSE-2.0

  Unless required by applicable law or agreed to in writing, software
  distributed under the License is distributed on an "AS IS" BASIS,
  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
  See the License for the specific language governing permissions and
  limitations under the License.
*/

//! End-to-end coverage of issuance, revocation, and status-list sharing
//! across both storage backends.

use std::sync::Arc;

use serde_json::json;
use vc_status_core::application::datatypes::{CredentialForm, IssueRequest};
use vc_status_core::application::lifecycle::CredentialLifecycle;
use vc_status_core::collaborators::{NullWebhookDispatcher, PermissiveSchemaValidator};
use vc_status_core::error::Error;
use vc_status_core::signing::{KeySigner, LocalKeySigner};
use vc_status_core::storage::memory::MemoryStorage;
use vc_status_core::storage::sled_store::SledStorage;
use vc_status_core::storage::Storage;

fn request(subject: &str, schema: &str, revocable: bool) -> IssueRequest {
    IssueRequest {
        issuer: "did:issuer:acme".into(),
        subject: subject.to_string(),
        schema: Some(schema.to_string()),
        credential_subject: json!({ "name": "Alice", "subject": subject }),
        revocable,
        form: CredentialForm::DataIntegrity,
        signing_key_id: "key-1".to_string(),
        verification_method: "did:issuer:acme#key-1".to_string(),
    }
}

fn make_lifecycle(storage: Arc<dyn Storage>) -> CredentialLifecycle {
    let signer: Arc<dyn KeySigner> = Arc::new(LocalKeySigner::with_key("key-1", b"secret".to_vec()));
    CredentialLifecycle::new(
        storage,
        signer,
        Arc::new(PermissiveSchemaValidator),
        Arc::new(NullWebhookDispatcher),
    )
}

async fn issuance_and_revocation_share_one_status_list(storage: Arc<dyn Storage>) {
    let lifecycle = make_lifecycle(storage);
    lifecycle.init().await.unwrap();

    let first = lifecycle
        .issue(request("did:subject:1", "diploma", true), None)
        .await
        .unwrap();
    let second = lifecycle
        .issue(request("did:subject:2", "diploma", true), None)
        .await
        .unwrap();

    let first_status = first.credential_status.as_ref().unwrap();
    let second_status = second.credential_status.as_ref().unwrap();
    assert_eq!(
        first_status.status_list_credential,
        second_status.status_list_credential
    );
    assert_ne!(first_status.index(), second_status.index());

    assert!(!lifecycle.verify_status(&first.credential_id, None).await.unwrap());
    assert!(!lifecycle.verify_status(&second.credential_id, None).await.unwrap());

    lifecycle.revoke(&first.credential_id, None).await.unwrap();

    assert!(lifecycle.verify_status(&first.credential_id, None).await.unwrap());
    assert!(!lifecycle.verify_status(&second.credential_id, None).await.unwrap());

    let fetched = lifecycle.lookup(&first.credential_id, None).await.unwrap();
    assert!(fetched.revoked);
}

async fn non_revocable_credentials_cannot_be_revoked(storage: Arc<dyn Storage>) {
    let lifecycle = make_lifecycle(storage);
    let stored = lifecycle
        .issue(request("did:subject:3", "badge", false), None)
        .await
        .unwrap();

    assert!(stored.credential_status.is_none());
    let err = lifecycle.revoke(&stored.credential_id, None).await.unwrap_err();
    assert!(matches!(err, Error::NotRevocable(_)));
}

async fn separate_schemas_get_separate_status_lists(storage: Arc<dyn Storage>) {
    let lifecycle = make_lifecycle(storage);
    lifecycle.init().await.unwrap();

    let diploma = lifecycle
        .issue(request("did:subject:1", "diploma", true), None)
        .await
        .unwrap();
    let badge = lifecycle
        .issue(request("did:subject:1", "badge", true), None)
        .await
        .unwrap();

    assert_ne!(
        diploma.credential_status.unwrap().status_list_credential,
        badge.credential_status.unwrap().status_list_credential
    );
}

async fn list_by_subject_returns_every_credential_for_that_subject(storage: Arc<dyn Storage>) {
    let lifecycle = make_lifecycle(storage);
    lifecycle
        .issue(request("did:subject:shared", "diploma", false), None)
        .await
        .unwrap();
    lifecycle
        .issue(request("did:subject:shared", "badge", false), None)
        .await
        .unwrap();
    lifecycle
        .issue(request("did:subject:other", "badge", false), None)
        .await
        .unwrap();

    let found = lifecycle.list_by_subject("did:subject:shared", None).await.unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn memory_backend_covers_full_lifecycle() {
    match env_logger::try_init() {
        Ok(_) | Err(_) => (),
    };

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    issuance_and_revocation_share_one_status_list(storage).await;

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    non_revocable_credentials_cannot_be_revoked(storage).await;

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    separate_schemas_get_separate_status_lists(storage).await;

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    list_by_subject_returns_every_credential_for_that_subject(storage).await;
}

#[tokio::test]
async fn sled_backend_covers_full_lifecycle() {
    match env_logger::try_init() {
        Ok(_) | Err(_) => (),
    };

    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(SledStorage::open(dir.path()).unwrap());
    issuance_and_revocation_share_one_status_list(storage).await;

    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(SledStorage::open(dir.path()).unwrap());
    non_revocable_credentials_cannot_be_revoked(storage).await;

    let dir = tempfile::tempdir().unwrap();
    let storage: Arc<dyn Storage> = Arc::new(SledStorage::open(dir.path()).unwrap());
    separate_schemas_get_separate_status_lists(storage).await;
}

#[tokio::test]
async fn revoking_an_unknown_credential_is_not_found() {
    match env_logger::try_init() {
        Ok(_) | Err(_) => (),
    };

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let lifecycle = make_lifecycle(storage);
    let err = lifecycle.revoke("urn:uuid:does-not-exist", None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
