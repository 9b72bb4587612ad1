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

//! Wire types for issued credentials and status-list credentials.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Either a bare DID string, or `{ "id": "<did>" }`. Always normalizes to a
/// plain identifier string before it reaches a denormalized field or the
/// compound key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum IssuerRef {
    Id(String),
    Object { id: String },
}

impl IssuerRef {
    pub fn as_str(&self) -> &str {
        match self {
            IssuerRef::Id(id) => id,
            IssuerRef::Object { id } => id,
        }
    }
}

impl From<&str> for IssuerRef {
    fn from(value: &str) -> Self {
        IssuerRef::Id(value.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSchemaRef {
    pub id: String,
    #[serde(default = "default_schema_type")]
    pub r#type: String,
}

fn default_schema_type() -> String {
    "JsonSchemaValidator2018".to_string()
}

/// The `credentialStatus` block embedded in a regular VC, pointing at its
/// status-list VC and bit index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatusRef {
    pub id: String,
    pub r#type: String,
    pub status_purpose: String,
    pub status_list_index: String,
    pub status_list_credential: String,
}

impl CredentialStatusRef {
    pub fn new(status_list_credential_id: &str, index: u32) -> Self {
        CredentialStatusRef {
            id: format!("{}#{}", status_list_credential_id, index),
            r#type: "StatusList2021Entry".to_string(),
            status_purpose: "revocation".to_string(),
            status_list_index: index.to_string(),
            status_list_credential: status_list_credential_id.to_string(),
        }
    }

    pub fn index(&self) -> u32 {
        self.status_list_index.parse().unwrap_or(0)
    }
}

/// Detached signature proof for the data-integrity credential form. The
/// signature value is whatever bytes the key oracle returns, hex-encoded,
/// rather than being tied to a specific signature scheme.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataIntegrityProof {
    pub r#type: String,
    pub created: String,
    pub proof_purpose: String,
    pub verification_method: String,
    pub signature_value: String,
}

/// A W3C Verifiable Credential. Used both for regular issued credentials
/// (data-integrity form) and for status-list credentials, whose
/// `credential_subject` carries the encoded bitstring instead of claims
/// about a natural-person subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub r#type: Vec<String>,
    pub issuer: IssuerRef,
    pub issuance_date: String,
    pub credential_subject: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_schema: Option<CredentialSchemaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<CredentialStatusRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<DataIntegrityProof>,
}

impl VerifiableCredential {
    pub const DEFAULT_CONTEXT: &'static str = "https://www.w3.org/2018/credentials/v1";
}

/// A Stored Credential, as persisted in the `credential` namespace. Exactly
/// one of `credential`/`token` must be present — enforced by
/// [`crate::application::credential_store::CredentialStore::put`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredCredential {
    /// The compound prefix key; empty until first `put`.
    #[serde(default)]
    pub id: String,
    pub credential_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<VerifiableCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub issuer: String,
    pub subject: String,
    #[serde(default)]
    pub schema: String,
    pub issuance_date: String,
    pub revoked: bool,
    /// Denormalized out of `credential.credential_status` (or, for the JWT
    /// form, carried alongside it) so revocation doesn't need to re-parse
    /// the credential form to find its bit index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_status: Option<CredentialStatusRef>,
    /// Key id the issuer signed this credential with, kept so revocation
    /// can re-sign the owning status-list VC with the same key.
    #[serde(default)]
    pub signing_key_id: String,
}

impl StoredCredential {
    /// True if this credential has a revocation index assigned, i.e. is
    /// capable of being revoked.
    pub fn is_revocable(&self) -> bool {
        self.credential_status.is_some()
    }
}

/// A request to issue a new credential, as accepted by
/// [`crate::application::lifecycle::CredentialLifecycle::issue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub issuer: IssuerRef,
    pub subject: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub credential_subject: Value,
    #[serde(default)]
    pub revocable: bool,
    #[serde(default)]
    pub form: CredentialForm,
    /// Key id the key oracle should use to sign this credential.
    pub signing_key_id: String,
    /// Verification method DID URL recorded on the data-integrity proof.
    pub verification_method: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialForm {
    DataIntegrity,
    Jwt,
}

impl Default for CredentialForm {
    fn default() -> Self {
        CredentialForm::DataIntegrity
    }
}
