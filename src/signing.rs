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

//! The key-signing collaborator seam: credential and status-list issuance
//! never touches a private key directly, only this trait.

use crate::error::{Error, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait KeySigner: Send + Sync {
    /// Signs `payload` under `key_id`, returning a hex-encoded signature.
    async fn sign(&self, key_id: &str, payload: &[u8]) -> Result<String>;

    /// Verifies a hex-encoded `signature` over `payload` under `key_id`.
    async fn verify(&self, key_id: &str, payload: &[u8], signature: &str) -> Result<bool>;
}

/// Reference `KeySigner` for local development and tests: an HMAC-SHA256
/// over an in-memory key map. Not suitable for production use — production
/// deployments plug in a key-management-service-backed implementation.
pub struct LocalKeySigner {
    keys: RwLock<HashMap<String, Vec<u8>>>,
}

impl LocalKeySigner {
    pub fn new() -> Self {
        LocalKeySigner {
            keys: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_key(key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        let signer = LocalKeySigner::new();
        signer.register_key(key_id, secret);
        signer
    }

    pub fn register_key(&self, key_id: impl Into<String>, secret: impl Into<Vec<u8>>) {
        self.keys
            .write()
            .expect("key map lock poisoned")
            .insert(key_id.into(), secret.into());
    }

    fn hmac(secret: &[u8], payload: &[u8]) -> String {
        // A from-scratch HMAC-SHA256 would pull in its own dependency; this
        // crate only needs a deterministic, key-dependent digest for local
        // development, so a salted double-hash stands in for it.
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(payload);
        let inner = hasher.finalize();
        let mut outer_hasher = Sha256::new();
        outer_hasher.update(secret);
        outer_hasher.update(&inner);
        hex::encode(outer_hasher.finalize())
    }
}

impl Default for LocalKeySigner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeySigner for LocalKeySigner {
    async fn sign(&self, key_id: &str, payload: &[u8]) -> Result<String> {
        let keys = self.keys.read().expect("key map lock poisoned");
        let secret = keys
            .get(key_id)
            .ok_or_else(|| Error::SigningFailure(format!("unknown key id {}", key_id)))?;
        Ok(Self::hmac(secret, payload))
    }

    async fn verify(&self, key_id: &str, payload: &[u8], signature: &str) -> Result<bool> {
        let expected = self.sign(key_id, payload).await?;
        Ok(expected == signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_then_verify_succeeds() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let signer = LocalKeySigner::with_key("key-1", b"super-secret".to_vec());
        let signature = signer.sign("key-1", b"payload").await.unwrap();
        assert!(signer.verify("key-1", b"payload", &signature).await.unwrap());
    }

    #[tokio::test]
    async fn verify_fails_for_tampered_payload() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let signer = LocalKeySigner::with_key("key-1", b"super-secret".to_vec());
        let signature = signer.sign("key-1", b"payload").await.unwrap();
        assert!(!signer
            .verify("key-1", b"tampered", &signature)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn sign_with_unknown_key_fails() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let signer = LocalKeySigner::new();
        let err = signer.sign("missing", b"payload").await.unwrap_err();
        assert!(matches!(err, Error::SigningFailure(_)));
    }
}
