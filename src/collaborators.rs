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

//! Collaborator seams this crate calls out to but does not own: DID
//! resolution, schema validation, and webhook fan-out. Each is injected
//! rather than resolved inline, so a caller can swap in a real
//! implementation without this crate knowing about it.

use crate::error::Result;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<Value>;
}

/// Reference resolver backed by a fixed in-memory document map, for tests.
pub struct StaticDidResolver {
    documents: RwLock<HashMap<String, Value>>,
}

impl StaticDidResolver {
    pub fn new() -> Self {
        StaticDidResolver {
            documents: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, did: impl Into<String>, document: Value) {
        self.documents
            .write()
            .expect("document map lock poisoned")
            .insert(did.into(), document);
    }
}

impl Default for StaticDidResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DidResolver for StaticDidResolver {
    async fn resolve(&self, did: &str) -> Result<Value> {
        let documents = self.documents.read().expect("document map lock poisoned");
        match documents.get(did) {
            Some(document) => Ok(document.clone()),
            None => Ok(Value::Null),
        }
    }
}

#[async_trait]
pub trait SchemaValidator: Send + Sync {
    async fn validate(&self, schema_id: &str, subject: &Value) -> Result<()>;
}

/// Accepts every subject unconditionally. Used when `schema` is absent on
/// an issue request, or when schema validation is disabled in config.
pub struct PermissiveSchemaValidator;

#[async_trait]
impl SchemaValidator for PermissiveSchemaValidator {
    async fn validate(&self, _schema_id: &str, _subject: &Value) -> Result<()> {
        Ok(())
    }
}

/// Minimal validator: checks that a fixed set of top-level fields are
/// present and non-null on the subject, regardless of `schema_id`.
pub struct RequiredFieldsValidator {
    required: Vec<String>,
}

impl RequiredFieldsValidator {
    pub fn new(required: Vec<String>) -> Self {
        RequiredFieldsValidator { required }
    }
}

#[async_trait]
impl SchemaValidator for RequiredFieldsValidator {
    async fn validate(&self, schema_id: &str, subject: &Value) -> Result<()> {
        for field in &self.required {
            if subject.get(field).map(Value::is_null).unwrap_or(true) {
                return Err(crate::error::Error::Invalid(format!(
                    "credential subject missing required field '{}' for schema {}",
                    field, schema_id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    /// Fire-and-forget notification. Implementations should not block the
    /// caller on network I/O; the lifecycle layer calls this only after a
    /// transaction has committed.
    async fn notify(&self, noun: &str, verb: &str, payload: Value);
}

/// Default dispatcher: logs at debug level and drops the notification.
pub struct NullWebhookDispatcher;

#[async_trait]
impl WebhookDispatcher for NullWebhookDispatcher {
    async fn notify(&self, noun: &str, verb: &str, payload: Value) {
        debug!("webhook dispatch skipped (no dispatcher configured): {} {} {:?}", noun, verb, payload);
    }
}

/// Dispatcher that logs every notification at warn level; useful as a
/// placeholder until a real HTTP-backed dispatcher is wired in (out of
/// scope for this crate).
pub struct LoggingWebhookDispatcher;

#[async_trait]
impl WebhookDispatcher for LoggingWebhookDispatcher {
    async fn notify(&self, noun: &str, verb: &str, payload: Value) {
        warn!("webhook {} {}: {}", noun, verb, payload);
    }
}
