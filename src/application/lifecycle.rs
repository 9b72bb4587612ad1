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

//! Credential Lifecycle API: orchestrates issuance, status assignment, and
//! revocation as atomic units on top of the credential store, the index
//! allocator, and the status-list engine.

use crate::application::credential_store::{CredentialStore, ListField, NS_CREDENTIAL};
use crate::application::datatypes::{
    CredentialForm, CredentialStatusRef, DataIntegrityProof, IssueRequest, StoredCredential,
    VerifiableCredential,
};
use crate::application::status_list::allocator::StatusListIndexAllocator;
use crate::application::status_list::engine::StatusListCredentialEngine;
use crate::cancellation::CancellationToken;
use crate::collaborators::{SchemaValidator, WebhookDispatcher};
use crate::error::{Error, Result};
use crate::signing::KeySigner;
use crate::storage::{execute_value, Storage};
use crate::utils::utils::{generate_uuid, get_now_as_iso_string};
use data_encoding::BASE64URL_NOPAD;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct CredentialLifecycle {
    storage: Arc<dyn Storage>,
    credential_store: CredentialStore,
    allocator: StatusListIndexAllocator,
    status_list_engine: Arc<StatusListCredentialEngine>,
    signer: Arc<dyn KeySigner>,
    schema_validator: Arc<dyn SchemaValidator>,
    webhook: Arc<dyn WebhookDispatcher>,
}

impl CredentialLifecycle {
    pub fn new(
        storage: Arc<dyn Storage>,
        signer: Arc<dyn KeySigner>,
        schema_validator: Arc<dyn SchemaValidator>,
        webhook: Arc<dyn WebhookDispatcher>,
    ) -> Self {
        CredentialLifecycle {
            storage: storage.clone(),
            credential_store: CredentialStore::new(storage.clone()),
            allocator: StatusListIndexAllocator::new(storage.clone()),
            status_list_engine: Arc::new(StatusListCredentialEngine::new(
                storage,
                signer.clone(),
            )),
            signer,
            schema_validator,
            webhook,
        }
    }

    /// Must be called once before the first call to [`Self::issue`] of a
    /// revocable credential; subsequent calls are no-ops.
    pub async fn init(&self) -> Result<()> {
        self.allocator.init().await
    }

    fn check_cancelled(cancellation: Option<&CancellationToken>) -> Result<()> {
        match cancellation {
            Some(token) if token.is_cancelled() => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    fn build_vc(request: &IssueRequest, credential_id: &str) -> VerifiableCredential {
        VerifiableCredential {
            context: vec![VerifiableCredential::DEFAULT_CONTEXT.to_string()],
            id: credential_id.to_string(),
            r#type: vec!["VerifiableCredential".to_string()],
            issuer: request.issuer.clone(),
            issuance_date: get_now_as_iso_string(),
            credential_subject: request.credential_subject.clone(),
            credential_schema: None,
            credential_status: None,
            proof: None,
        }
    }

    async fn sign_data_integrity(
        signer: &Arc<dyn KeySigner>,
        vc: &mut VerifiableCredential,
        request: &IssueRequest,
    ) -> Result<()> {
        let payload = serde_json::to_vec(&vc.credential_subject)?;
        let signature_value = signer.sign(&request.signing_key_id, &payload).await?;
        vc.proof = Some(DataIntegrityProof {
            r#type: "Ed25519Signature2020".to_string(),
            created: get_now_as_iso_string(),
            proof_purpose: "assertionMethod".to_string(),
            verification_method: request.verification_method.clone(),
            signature_value,
        });
        Ok(())
    }

    async fn sign_jwt(
        signer: &Arc<dyn KeySigner>,
        vc: &VerifiableCredential,
        request: &IssueRequest,
    ) -> Result<String> {
        let header = BASE64URL_NOPAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = json!({ "vc": vc });
        let payload = BASE64URL_NOPAD.encode(&serde_json::to_vec(&claims)?);
        let signing_input = format!("{}.{}", header, payload);
        let signature = signer
            .sign(&request.signing_key_id, signing_input.as_bytes())
            .await?;
        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Issues a new credential per `request`. Revocable issuance reserves a
    /// status-list index and ensures the owning status-list VC exists, all
    /// inside one transaction with the credential write. `cancellation`, if
    /// given, is checked before each suspension point this method controls;
    /// once the transaction below is entered it always runs to completion —
    /// cancelling after commit has no effect on the stored state.
    pub async fn issue(
        &self,
        request: IssueRequest,
        cancellation: Option<&CancellationToken>,
    ) -> Result<StoredCredential> {
        Self::check_cancelled(cancellation)?;
        if request.subject.trim().is_empty() {
            return Err(Error::Invalid("subject must not be empty".to_string()));
        }
        let schema = request.schema.clone().unwrap_or_default();
        if !schema.is_empty() {
            self.schema_validator
                .validate(&schema, &request.credential_subject)
                .await?;
        }
        Self::check_cancelled(cancellation)?;

        let credential_id = format!("urn:uuid:{}", generate_uuid());
        let issuer = request.issuer.as_str().to_string();

        if !request.revocable {
            let stored =
                Self::build_stored_credential(&request, &credential_id, None, &issuer, &schema)?;
            let stored = Self::sign_and_finalize(&self.signer, stored, &request).await?;
            Self::check_cancelled(cancellation)?;
            let stored = self.credential_store.put(NS_CREDENTIAL, stored, None).await?;
            self.notify_issued(&stored).await;
            return Ok(stored);
        }

        Self::check_cancelled(cancellation)?;
        let store = self.credential_store.clone();
        let allocator = self.allocator.clone();
        let engine = self.status_list_engine.clone();
        let signer = self.signer.clone();
        let request_clone = request.clone();
        let credential_id_clone = credential_id.clone();
        let issuer_clone = issuer.clone();
        let schema_clone = schema.clone();

        let stored: StoredCredential = execute_value(&self.storage, move |tx| {
            let request = request_clone;
            let credential_id = credential_id_clone;
            let issuer = issuer_clone;
            let schema = schema_clone;
            Box::pin(async move {
                let index = allocator.next_index(tx).await?;
                let list_record = engine
                    .get_or_create(
                        &issuer,
                        &schema,
                        &request.signing_key_id,
                        &request.verification_method,
                        tx,
                    )
                    .await?;
                let status = CredentialStatusRef::new(&list_record.credential_id, index);

                let stored = Self::build_stored_credential(
                    &request,
                    &credential_id,
                    Some(status),
                    &issuer,
                    &schema,
                )?;
                let stored = Self::sign_and_finalize(&signer, stored, &request).await?;
                let stored = store.put(NS_CREDENTIAL, stored, Some(tx)).await?;
                allocator.increment(tx).await?;
                Ok(stored)
            })
        })
        .await?;

        self.notify_issued(&stored).await;
        Ok(stored)
    }

    fn build_stored_credential(
        request: &IssueRequest,
        credential_id: &str,
        status: Option<CredentialStatusRef>,
        issuer: &str,
        schema: &str,
    ) -> Result<StoredCredential> {
        Ok(StoredCredential {
            id: String::new(),
            credential_id: credential_id.to_string(),
            credential: None,
            token: None,
            issuer: issuer.to_string(),
            subject: request.subject.clone(),
            schema: schema.to_string(),
            issuance_date: get_now_as_iso_string(),
            revoked: false,
            credential_status: status,
            signing_key_id: request.signing_key_id.clone(),
        })
    }

    async fn sign_and_finalize(
        signer: &Arc<dyn KeySigner>,
        mut stored: StoredCredential,
        request: &IssueRequest,
    ) -> Result<StoredCredential> {
        let mut vc = Self::build_vc(request, &stored.credential_id);
        vc.credential_status = stored.credential_status.clone();

        match request.form {
            CredentialForm::DataIntegrity => {
                Self::sign_data_integrity(signer, &mut vc, request).await?;
                stored.credential = Some(vc);
            }
            CredentialForm::Jwt => {
                let token = Self::sign_jwt(signer, &vc, request).await?;
                stored.token = Some(token);
            }
        }
        Ok(stored)
    }

    async fn notify_issued(&self, stored: &StoredCredential) {
        let payload: Value = json!({
            "credentialId": stored.credential_id,
            "issuer": stored.issuer,
            "subject": stored.subject,
        });
        self.webhook.notify("credential", "issued", payload).await;
    }

    /// Revokes `credential_id`. No-op if already revoked; errors with
    /// [`Error::NotRevocable`] if the credential has no assigned index.
    pub async fn revoke(
        &self,
        credential_id: &str,
        cancellation: Option<&CancellationToken>,
    ) -> Result<()> {
        Self::check_cancelled(cancellation)?;
        let credential = self.credential_store.get(NS_CREDENTIAL, credential_id).await?;
        if credential.revoked {
            return Ok(());
        }
        if !credential.is_revocable() {
            return Err(Error::NotRevocable(credential_id.to_string()));
        }
        Self::check_cancelled(cancellation)?;

        let engine = self.status_list_engine.clone();
        let credential_for_tx = credential.clone();
        self.storage
            .execute(Box::new(move |tx| {
                Box::pin(async move {
                    engine
                        .revoke(&credential_for_tx, tx)
                        .await
                        .map(|_| Vec::new())
                })
            }))
            .await?;

        self.webhook
            .notify(
                "credential",
                "revoked",
                json!({ "credentialId": credential_id }),
            )
            .await;
        Ok(())
    }

    pub async fn lookup(
        &self,
        credential_id: &str,
        cancellation: Option<&CancellationToken>,
    ) -> Result<StoredCredential> {
        Self::check_cancelled(cancellation)?;
        self.credential_store.get(NS_CREDENTIAL, credential_id).await
    }

    pub async fn list_by_subject(
        &self,
        subject: &str,
        cancellation: Option<&CancellationToken>,
    ) -> Result<Vec<StoredCredential>> {
        Self::check_cancelled(cancellation)?;
        self.credential_store
            .list_by(NS_CREDENTIAL, ListField::Subject, subject)
            .await
    }

    pub async fn verify_status(
        &self,
        credential_id: &str,
        cancellation: Option<&CancellationToken>,
    ) -> Result<bool> {
        Self::check_cancelled(cancellation)?;
        let credential = self.lookup(credential_id, None).await?;
        self.status_list_engine.verify_status(&credential).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{NullWebhookDispatcher, PermissiveSchemaValidator};
    use crate::signing::LocalKeySigner;
    use crate::storage::memory::MemoryStorage;
    use serde_json::json;

    fn make_lifecycle() -> CredentialLifecycle {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let signer: Arc<dyn KeySigner> =
            Arc::new(LocalKeySigner::with_key("key-1", b"secret".to_vec()));
        CredentialLifecycle::new(
            storage,
            signer,
            Arc::new(PermissiveSchemaValidator),
            Arc::new(NullWebhookDispatcher),
        )
    }

    fn sample_request(revocable: bool) -> IssueRequest {
        IssueRequest {
            issuer: "did:issuer".into(),
            subject: "did:subject".to_string(),
            schema: Some("sch1".to_string()),
            credential_subject: json!({ "name": "Alice" }),
            revocable,
            form: CredentialForm::DataIntegrity,
            signing_key_id: "key-1".to_string(),
            verification_method: "did:issuer#key-1".to_string(),
        }
    }

    #[tokio::test]
    async fn issue_non_revocable_credential_has_no_status() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let lifecycle = make_lifecycle();
        let stored = lifecycle.issue(sample_request(false), None).await.unwrap();
        assert!(!stored.is_revocable());
        assert!(stored.credential.is_some());
    }

    #[tokio::test]
    async fn issue_revocable_credential_assigns_status_and_can_be_revoked() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let lifecycle = make_lifecycle();
        lifecycle.init().await.unwrap();

        let stored = lifecycle.issue(sample_request(true), None).await.unwrap();
        assert!(stored.is_revocable());
        assert!(!lifecycle.verify_status(&stored.credential_id, None).await.unwrap());

        lifecycle.revoke(&stored.credential_id, None).await.unwrap();
        assert!(lifecycle.verify_status(&stored.credential_id, None).await.unwrap());

        // revoking again is a no-op, not an error
        lifecycle.revoke(&stored.credential_id, None).await.unwrap();
    }

    #[tokio::test]
    async fn revoke_of_non_revocable_credential_errors() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let lifecycle = make_lifecycle();
        let stored = lifecycle.issue(sample_request(false), None).await.unwrap();
        let err = lifecycle.revoke(&stored.credential_id, None).await.unwrap_err();
        assert!(matches!(err, Error::NotRevocable(_)));
    }

    #[tokio::test]
    async fn two_revocable_credentials_get_distinct_indexes() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let lifecycle = make_lifecycle();
        lifecycle.init().await.unwrap();

        let first = lifecycle.issue(sample_request(true), None).await.unwrap();
        let second = lifecycle.issue(sample_request(true), None).await.unwrap();

        let first_index = first.credential_status.unwrap().index();
        let second_index = second.credential_status.unwrap().index();
        assert_ne!(first_index, second_index);
    }

    #[tokio::test]
    async fn issue_rejects_blank_subject() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let lifecycle = make_lifecycle();
        let mut request = sample_request(false);
        request.subject = "  ".to_string();
        let err = lifecycle.issue(request, None).await.unwrap_err();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[tokio::test]
    async fn jwt_form_populates_token_not_credential() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let lifecycle = make_lifecycle();
        let mut request = sample_request(false);
        request.form = CredentialForm::Jwt;
        let stored = lifecycle.issue(request, None).await.unwrap();
        assert!(stored.token.is_some());
        assert!(stored.credential.is_none());
    }

    #[tokio::test]
    async fn cancelled_token_aborts_issue_before_any_write() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        use crate::cancellation::CancellationSource;

        let lifecycle = make_lifecycle();
        let (source, token) = CancellationSource::new();
        source.cancel();

        let err = lifecycle
            .issue(sample_request(false), Some(&token))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
