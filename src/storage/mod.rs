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

//! The KV substrate: a namespaced byte-blob store with prefix scans and
//! explicit, single-writer transactions.
//!
//! [`Storage`] is the contract; [`sled_store::SledStorage`]
//! and [`memory::MemoryStorage`] are the two backends this crate ships.

pub mod memory;
pub mod sled_store;

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// A single `(namespace, key, bytes)` write, as produced by
/// [`crate::application::status_list::allocator::StatusListIndexAllocator::get_increment_write`]
/// and bundled with other writes via [`Storage::write_many`].
#[derive(Debug, Clone)]
pub struct WriteOp {
    pub namespace: String,
    pub key: String,
    pub value: Vec<u8>,
}

impl WriteOp {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>, value: Vec<u8>) -> Self {
        WriteOp {
            namespace: namespace.into(),
            key: key.into(),
            value,
        }
    }
}

/// A running transaction. Reads observe prior writes made through the same
/// handle (read-your-writes); nothing is visible to other callers until the
/// closure passed to [`Storage::execute`] returns `Ok`.
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn read_tx(&mut self, ns: &str, key: &str) -> Result<Option<Vec<u8>>>;
    async fn write_tx(&mut self, ns: &str, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete_tx(&mut self, ns: &str, key: &str) -> Result<()>;
    async fn read_prefix_tx(&mut self, ns: &str, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>>;
}

/// The KV substrate contract. Every operation is scoped to a string
/// namespace; namespaces are created implicitly on first write.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn write(&self, ns: &str, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn read(&self, ns: &str, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, ns: &str, key: &str) -> Result<()>;
    async fn read_prefix(&self, ns: &str, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>>;
    async fn read_all_keys(&self, ns: &str) -> Result<Vec<String>>;

    async fn write_many(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.execute(Box::new(move |tx| {
            Box::pin(async move {
                for op in ops {
                    tx.write_tx(&op.namespace, &op.key, op.value).await?;
                }
                Ok(Vec::new())
            })
        }))
        .await?;
        Ok(())
    }

    /// Runs `op` inside a transaction. Any `Err` returned by `op` rolls the
    /// whole transaction back; `Ok` commits it. Nested calls to `execute`
    /// from within `op` are a deadlock hazard and must not be made.
    ///
    /// `op` returns an opaque byte payload rather than a generic `T` — a
    /// trait object's methods cannot be generic — so callers that need a
    /// typed result serialize it themselves; [`execute_value`] does this for
    /// the common case.
    async fn execute(
        &self,
        op: Box<
            dyn FnOnce(
                    &mut (dyn Transaction + Send)
                ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>>> + Send + '_>>
                + Send,
        >,
    ) -> Result<Vec<u8>>;

    /// Fetches the JSON object at `(ns, key)`, merges `updater`'s fields into
    /// it, writes it back, then hands the merged blob to `op_updater` to
    /// produce a second blob written at `(op_ns, op_key)` — all inside one
    /// transaction. Used by the status-list engine to update a credential
    /// record and its status-list VC atomically.
    async fn update_with_op(
        &self,
        ns: &str,
        key: &str,
        updater: BTreeMap<String, Value>,
        op_ns: &str,
        op_key: &str,
        op_updater: Box<dyn FnOnce(&Value) -> Result<Vec<u8>> + Send>,
    ) -> Result<()> {
        let ns = ns.to_string();
        let key = key.to_string();
        let op_ns = op_ns.to_string();
        let op_key = op_key.to_string();
        self.execute(Box::new(move |tx| {
            Box::pin(async move {
                let existing = tx
                    .read_tx(&ns, &key)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("{}/{}", ns, key)))?;
                let mut value: Value = serde_json::from_slice(&existing)?;
                let object = value
                    .as_object_mut()
                    .ok_or_else(|| Error::Invalid(format!("{}/{} is not a JSON object", ns, key)))?;
                for (field, field_value) in updater {
                    object.insert(field, field_value);
                }
                let merged = serde_json::to_vec(&value)?;
                tx.write_tx(&ns, &key, merged.clone()).await?;

                let op_bytes = op_updater(&value)?;
                tx.write_tx(&op_ns, &op_key, op_bytes).await?;
                Ok(Vec::new())
            })
        }))
        .await?;
        Ok(())
    }
}

/// Runs `op` inside a transaction and returns its typed result, serializing
/// across the `dyn Storage` boundary since a trait object's methods cannot
/// be generic. `op` itself is plain async code closed over `tx`; only the
/// wire representation is JSON.
pub async fn execute_value<T, F>(storage: &std::sync::Arc<dyn Storage>, op: F) -> Result<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
    F: FnOnce(
            &mut (dyn Transaction + Send),
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T>> + Send + '_>>
        + Send
        + 'static,
{
    let bytes = storage
        .execute(Box::new(move |tx| {
            Box::pin(async move {
                let value = op(tx).await?;
                Ok(serde_json::to_vec(&value)?)
            })
        }))
        .await?;
    Ok(serde_json::from_slice(&bytes)?)
}
