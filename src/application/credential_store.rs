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

//! Credential Store: encodes Stored Credentials under the compound
//! prefix key, and answers issuer/subject/schema lookups with a lazy O(N)
//! scan, acceptable at this crate's scale.

use crate::application::datatypes::StoredCredential;
use crate::error::{Error, Result};
use crate::storage::{Storage, Transaction};
use log::warn;
use std::sync::Arc;

pub const NS_CREDENTIAL: &str = "credential";
pub const NS_STATUS_LIST_CREDENTIAL: &str = "status-list-credential";

/// Field to filter a `list_by` lookup on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListField {
    Issuer,
    Subject,
    Schema,
}

/// Builds the compound prefix key: `"{id}-is:{issuer}-su:{subject}-sc:{schema}"`.
/// Wire-exact — the `-is:`/`-su:`/`-sc:` sigils and `sc:` as a trailing
/// suffix are load-bearing for every prefix scan in this module.
pub fn create_prefix_key(id: &str, issuer: &str, subject: &str, schema: &str) -> String {
    format!("{}-is:{}-su:{}-sc:{}", id, issuer, subject, schema)
}

#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        CredentialStore { storage }
    }

    fn validate(record: &StoredCredential) -> Result<()> {
        match (&record.credential, &record.token) {
            (Some(_), Some(_)) => Err(Error::Invalid(
                "stored credential carries both a data-integrity form and a JWT form".to_string(),
            )),
            (None, None) => Err(Error::Invalid(
                "stored credential carries neither a data-integrity form nor a JWT form"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Stores `record` under `ns`, computing its compound key from the
    /// denormalized fields. Uses `tx` if one is given; otherwise performs a
    /// single standalone write.
    pub async fn put(
        &self,
        ns: &str,
        mut record: StoredCredential,
        tx: Option<&mut (dyn Transaction + Send)>,
    ) -> Result<StoredCredential> {
        Self::validate(&record)?;
        let key = create_prefix_key(
            &record.credential_id,
            &record.issuer,
            &record.subject,
            &record.schema,
        );
        record.id = key.clone();
        let bytes = serde_json::to_vec(&record)?;

        match tx {
            Some(tx) => tx.write_tx(ns, &key, bytes).await?,
            None => self.storage.write(ns, &key, bytes).await?,
        }
        Ok(record)
    }

    /// Scans `ns` for the single entry whose key starts with
    /// `"{credential_id}-is:"`.
    pub async fn get(&self, ns: &str, credential_id: &str) -> Result<StoredCredential> {
        let prefix = format!("{}-is:", credential_id);
        let matches = self.storage.read_prefix(ns, &prefix).await?;
        Self::resolve_single(credential_id, matches)
    }

    fn resolve_single(
        credential_id: &str,
        matches: std::collections::BTreeMap<String, Vec<u8>>,
    ) -> Result<StoredCredential> {
        if matches.len() > 1 {
            return Err(Error::Ambiguous(format!(
                "found {} records for credential id {}",
                matches.len(),
                credential_id
            )));
        }
        let (_, bytes) = matches
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("credential {}", credential_id)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Enumerates `ns` and retains entries matching `field`/`value`, per the
    /// substring/suffix rules above. Individual unmarshal failures are
    /// logged and skipped (greedy semantics) rather than aborting the scan.
    pub async fn list_by(
        &self,
        ns: &str,
        field: ListField,
        value: &str,
    ) -> Result<Vec<StoredCredential>> {
        let keys = self.storage.read_all_keys(ns).await?;
        let mut results = Vec::new();
        for key in keys {
            let matches = match field {
                ListField::Issuer | ListField::Subject => key.contains(value),
                ListField::Schema => key.ends_with(&format!("sc:{}", value)),
            };
            if !matches {
                continue;
            }
            match self.storage.read(ns, &key).await? {
                Some(bytes) => match serde_json::from_slice::<StoredCredential>(&bytes) {
                    Ok(record) => results.push(record),
                    Err(e) => warn!("skipping undecodable record at {}/{}; {}", ns, key, e),
                },
                None => continue,
            }
        }
        Ok(results)
    }

    /// Like [`Self::list_by`] but filters on both issuer and schema at once
    /// — used by the status-list engine to find the VC for an
    /// (issuer, schema) pair.
    pub async fn list_by_issuer_and_schema(
        &self,
        ns: &str,
        issuer: &str,
        schema: &str,
    ) -> Result<Vec<StoredCredential>> {
        let keys = self.storage.read_all_keys(ns).await?;
        let mut results = Vec::new();
        let suffix = format!("sc:{}", schema);
        for key in keys {
            if !key.contains(issuer) || !key.ends_with(&suffix) {
                continue;
            }
            match self.storage.read(ns, &key).await? {
                Some(bytes) => match serde_json::from_slice::<StoredCredential>(&bytes) {
                    Ok(record) => results.push(record),
                    Err(e) => warn!("skipping undecodable record at {}/{}; {}", ns, key, e),
                },
                None => continue,
            }
        }
        Ok(results)
    }

    /// Resolves `credential_id` and deletes its compound key.
    /// Non-existence is a warning, not an error (idempotent delete).
    pub async fn delete(&self, ns: &str, credential_id: &str) -> Result<()> {
        match self.get(ns, credential_id).await {
            Ok(record) => {
                self.storage.delete(ns, &record.id).await?;
                Ok(())
            }
            Err(Error::NotFound(_)) => {
                warn!("delete called on nonexistent credential {}", credential_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
