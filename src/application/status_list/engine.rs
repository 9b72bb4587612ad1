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

//! Status-List Credential Engine: owns one signed status-list VC per
//! (issuer, schema) pair, flips bits on revocation, and re-signs on every
//! change.

use crate::application::credential_store::{CredentialStore, ListField, NS_CREDENTIAL, NS_STATUS_LIST_CREDENTIAL};
use crate::application::datatypes::{
    CredentialStatusRef, DataIntegrityProof, IssuerRef, StoredCredential, VerifiableCredential,
};
use crate::application::status_list::bitstring::Bitstring;
use crate::error::{Error, Result};
use crate::signing::KeySigner;
use crate::storage::{execute_value, Storage, Transaction};
use crate::utils::utils::{generate_uuid, get_now_as_iso_string};
use serde_json::json;
use std::sync::Arc;

pub struct StatusListCredentialEngine {
    credential_store: CredentialStore,
    signer: Arc<dyn KeySigner>,
}

impl StatusListCredentialEngine {
    pub fn new(storage: Arc<dyn Storage>, signer: Arc<dyn KeySigner>) -> Self {
        StatusListCredentialEngine {
            credential_store: CredentialStore::new(storage),
            signer,
        }
    }

    fn new_empty_list_vc(issuer: &str, verification_method: &str) -> Result<VerifiableCredential> {
        let id = format!("urn:uuid:{}", generate_uuid());
        let empty_bitstring = Bitstring::new_all_unset().encode()?;
        Ok(VerifiableCredential {
            context: vec![VerifiableCredential::DEFAULT_CONTEXT.to_string()],
            id: id.clone(),
            r#type: vec![
                "VerifiableCredential".to_string(),
                "StatusList2021Credential".to_string(),
            ],
            issuer: IssuerRef::from(issuer),
            issuance_date: get_now_as_iso_string(),
            credential_subject: json!({
                "id": format!("{}#list", id),
                "type": "StatusList2021",
                "statusPurpose": "revocation",
                "encodedList": empty_bitstring,
            }),
            credential_schema: None,
            credential_status: None,
            proof: Some(DataIntegrityProof {
                r#type: "Ed25519Signature2020".to_string(),
                created: get_now_as_iso_string(),
                proof_purpose: "assertionMethod".to_string(),
                verification_method: verification_method.to_string(),
                signature_value: String::new(),
            }),
        })
    }

    async fn sign_vc(&self, vc: &mut VerifiableCredential, signing_key_id: &str) -> Result<()> {
        let proof = vc
            .proof
            .as_mut()
            .ok_or_else(|| Error::Invalid("status list VC missing proof scaffold".to_string()))?;
        proof.signature_value = String::new();
        proof.created = get_now_as_iso_string();
        let payload = serde_json::to_vec(&vc.credential_subject)?;
        let signature = self.signer.sign(signing_key_id, &payload).await?;
        vc.proof.as_mut().unwrap().signature_value = signature;
        Ok(())
    }

    /// Finds or lazily creates the status-list VC for `(issuer, schema)`.
    pub async fn get_or_create(
        &self,
        issuer: &str,
        schema: &str,
        signing_key_id: &str,
        verification_method: &str,
        tx: &mut (dyn Transaction + Send),
    ) -> Result<StoredCredential> {
        let existing = self
            .credential_store
            .list_by_issuer_and_schema(NS_STATUS_LIST_CREDENTIAL, issuer, schema)
            .await?;
        if let Some(found) = existing.into_iter().next() {
            return Ok(found);
        }

        let mut vc = Self::new_empty_list_vc(issuer, verification_method)?;
        self.sign_vc(&mut vc, signing_key_id).await?;

        let stored = StoredCredential {
            id: String::new(),
            credential_id: vc.id.clone(),
            credential: Some(vc),
            token: None,
            issuer: issuer.to_string(),
            subject: format!("{}#list", issuer),
            schema: schema.to_string(),
            issuance_date: get_now_as_iso_string(),
            revoked: false,
            credential_status: None,
            signing_key_id: signing_key_id.to_string(),
        };
        self.credential_store
            .put(NS_STATUS_LIST_CREDENTIAL, stored, Some(tx))
            .await
    }

    /// Flips the bit for `credential`'s revocation index and re-signs the
    /// owning status-list VC. Idempotent if the bit is already set.
    pub async fn revoke(
        &self,
        credential: &StoredCredential,
        tx: &mut (dyn Transaction + Send),
    ) -> Result<()> {
        let status = credential
            .credential_status
            .as_ref()
            .ok_or_else(|| Error::NotRevocable(credential.credential_id.clone()))?;

        let list_credentials = self
            .credential_store
            .list_by(NS_STATUS_LIST_CREDENTIAL, ListField::Issuer, &credential.issuer)
            .await?;
        let mut list_record = list_credentials
            .into_iter()
            .find(|record| record.credential_id == status.status_list_credential)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "status list credential {}",
                    status.status_list_credential
                ))
            })?;

        let mut vc = list_record
            .credential
            .take()
            .ok_or_else(|| Error::Invalid("status list record missing credential form".to_string()))?;

        let encoded = vc
            .credential_subject
            .get("encodedList")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Invalid("status list VC missing encodedList".to_string()))?
            .to_string();
        let mut bits = Bitstring::decode(&encoded)?;
        bits.set(status.index(), true)?;
        let reencoded = bits.encode()?;
        vc.credential_subject["encodedList"] = json!(reencoded);

        let signing_key_id = list_record.signing_key_id.clone();
        self.sign_vc(&mut vc, &signing_key_id).await?;
        list_record.credential = Some(vc);

        self.credential_store
            .put(NS_STATUS_LIST_CREDENTIAL, list_record, Some(&mut *tx))
            .await?;

        let mut updated = credential.clone();
        updated.revoked = true;
        self.credential_store
            .put(NS_CREDENTIAL, updated, Some(&mut *tx))
            .await?;
        Ok(())
    }

    /// Returns the revocation state recorded in `credential`'s status-list
    /// VC for its assigned index.
    pub async fn verify_status(&self, credential: &StoredCredential) -> Result<bool> {
        let status = credential
            .credential_status
            .as_ref()
            .ok_or_else(|| Error::NotRevocable(credential.credential_id.clone()))?;

        let list_record = self
            .credential_store
            .get(NS_STATUS_LIST_CREDENTIAL, &status.status_list_credential)
            .await?;
        let vc = list_record
            .credential
            .as_ref()
            .ok_or_else(|| Error::Invalid("status list record missing credential form".to_string()))?;
        let encoded = vc
            .credential_subject
            .get("encodedList")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Invalid("status list VC missing encodedList".to_string()))?;
        let bits = Bitstring::decode(encoded)?;
        bits.get(status.index())
    }

    pub fn credential_status_for(status_list_credential_id: &str, index: u32) -> CredentialStatusRef {
        CredentialStatusRef::new(status_list_credential_id, index)
    }
}
