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

//! `sled`-backed [`Storage`] implementation. One `sled::Tree` per namespace,
//! opened lazily and cached. Callers of `execute` are serialized through a
//! single `tokio::sync::Mutex` — a single-writer, BoltDB-style contract, the
//! simplest one to implement correctly; the staged overlay a transaction
//! builds up is then committed with `sled`'s own multi-tree transaction API
//! so a commit touching more than one namespace (e.g. the credential tree
//! and the status-list index cursor) is all-or-nothing even if it errors
//! partway through.

use crate::error::{Error, Result};
use crate::storage::{Storage, Transaction};
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionResult, TransactionError, Transactional};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SledStorage {
    db: sled::Db,
    /// Guards every mutating operation; reads may run concurrently with it
    /// via `sled`'s own MVCC but are still funneled through here for
    /// simplicity and to keep the read/write story in one place.
    writer_lock: Arc<Mutex<()>>,
}

impl SledStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(SledStorage {
            db,
            writer_lock: Arc::new(Mutex::new(())),
        })
    }

    fn tree(&self, ns: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(ns)?)
    }
}

#[async_trait]
impl Storage for SledStorage {
    async fn write(&self, ns: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let _guard = self.writer_lock.lock().await;
        let tree = self.tree(ns)?;
        tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    async fn read(&self, ns: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let tree = self.tree(ns)?;
        Ok(tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn delete(&self, ns: &str, key: &str) -> Result<()> {
        let _guard = self.writer_lock.lock().await;
        let tree = self.tree(ns)?;
        tree.remove(key.as_bytes())?;
        Ok(())
    }

    async fn read_prefix(&self, ns: &str, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let tree = self.tree(ns)?;
        let mut matches = BTreeMap::new();
        for entry in tree.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let key = String::from_utf8_lossy(&key).to_string();
            matches.insert(key, value.to_vec());
        }
        Ok(matches)
    }

    async fn read_all_keys(&self, ns: &str) -> Result<Vec<String>> {
        let tree = self.tree(ns)?;
        let mut keys = Vec::new();
        for entry in tree.iter() {
            let (key, _) = entry?;
            keys.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(keys)
    }

    async fn execute(
        &self,
        op: Box<
            dyn FnOnce(
                    &mut (dyn Transaction + Send),
                ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>>> + Send + '_>>
                + Send,
        >,
    ) -> Result<Vec<u8>> {
        let _guard = self.writer_lock.lock().await;
        let mut staged = SledTransaction {
            db: self.db.clone(),
            overlay: BTreeMap::new(),
        };
        let result = op(&mut staged).await?;

        if staged.overlay.is_empty() {
            return Ok(result);
        }

        // Every namespace the overlay touches is opened up front and
        // committed in a single sled transaction, so a partial failure never
        // leaves one tree updated and another stale.
        let mut namespaces: Vec<String> = Vec::new();
        for (ns, _) in staged.overlay.keys() {
            if !namespaces.contains(ns) {
                namespaces.push(ns.clone());
            }
        }
        let trees = namespaces
            .iter()
            .map(|ns| self.tree(ns))
            .collect::<Result<Vec<_>>>()?;

        trees
            .as_slice()
            .transaction(|tx_trees| -> ConflictableTransactionResult<(), sled::Error> {
                for ((ns, key), value) in &staged.overlay {
                    let idx = namespaces.iter().position(|n| n == ns).unwrap();
                    match value {
                        Some(bytes) => {
                            tx_trees[idx].insert(key.as_bytes(), bytes.clone())?;
                        }
                        None => {
                            tx_trees[idx].remove(key.as_bytes())?;
                        }
                    }
                }
                Ok(())
            })
            .map_err(|err: TransactionError<sled::Error>| Error::StorageFailure(err.to_string()))?;

        for tree in &trees {
            tree.flush()?;
        }
        Ok(result)
    }
}

/// Staged writes kept entirely in memory until `execute` commits them; a
/// transaction that errors simply drops this struct and never touches the
/// underlying trees.
struct SledTransaction {
    db: sled::Db,
    overlay: BTreeMap<(String, String), Option<Vec<u8>>>,
}

impl SledTransaction {
    fn tree(&self, ns: &str) -> Result<sled::Tree> {
        Ok(self.db.open_tree(ns)?)
    }
}

#[async_trait]
impl Transaction for SledTransaction {
    async fn read_tx(&mut self, ns: &str, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.overlay.get(&(ns.to_string(), key.to_string())) {
            return Ok(staged.clone());
        }
        let tree = self.tree(ns)?;
        Ok(tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn write_tx(&mut self, ns: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.overlay
            .insert((ns.to_string(), key.to_string()), Some(value));
        Ok(())
    }

    async fn delete_tx(&mut self, ns: &str, key: &str) -> Result<()> {
        self.overlay.insert((ns.to_string(), key.to_string()), None);
        Ok(())
    }

    async fn read_prefix_tx(&mut self, ns: &str, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let tree = self.tree(ns)?;
        let mut result = BTreeMap::new();
        for entry in tree.scan_prefix(prefix.as_bytes()) {
            let (key, value) = entry?;
            let key = String::from_utf8_lossy(&key).to_string();
            result.insert(key, value.to_vec());
        }
        for ((overlay_ns, key), value) in &self.overlay {
            if overlay_ns != ns || !key.starts_with(prefix) {
                continue;
            }
            match value {
                Some(bytes) => {
                    result.insert(key.clone(), bytes.clone());
                }
                None => {
                    result.remove(key);
                }
            }
        }
        Ok(result)
    }
}
