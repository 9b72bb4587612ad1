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

//! Pure in-memory [`Storage`] implementation, used by the test suite so
//! tests don't need a tempdir-backed `sled` instance for every case.
//! Mirrors the `MockStorageProvider` shape of a hand-rolled reference
//! storage backend: same single-writer-mutex discipline as
//! [`super::sled_store::SledStorage`], no persistence.

use crate::error::Result;
use crate::storage::{Storage, Transaction};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Namespaces = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

#[derive(Default)]
pub struct MemoryStorage {
    namespaces: Arc<Mutex<Namespaces>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            namespaces: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write(&self, ns: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut namespaces = self.namespaces.lock().await;
        namespaces
            .entry(ns.to_string())
            .or_insert_with(BTreeMap::new)
            .insert(key.to_string(), bytes);
        Ok(())
    }

    async fn read(&self, ns: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let namespaces = self.namespaces.lock().await;
        Ok(namespaces.get(ns).and_then(|tree| tree.get(key).cloned()))
    }

    async fn delete(&self, ns: &str, key: &str) -> Result<()> {
        let mut namespaces = self.namespaces.lock().await;
        if let Some(tree) = namespaces.get_mut(ns) {
            tree.remove(key);
        }
        Ok(())
    }

    async fn read_prefix(&self, ns: &str, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let namespaces = self.namespaces.lock().await;
        let matches = namespaces
            .get(ns)
            .map(|tree| {
                tree.iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(matches)
    }

    async fn read_all_keys(&self, ns: &str) -> Result<Vec<String>> {
        let namespaces = self.namespaces.lock().await;
        Ok(namespaces
            .get(ns)
            .map(|tree| tree.keys().cloned().collect())
            .unwrap_or_default())
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
        let mut guard = self.namespaces.lock().await;
        let mut staged = MemoryTransaction {
            base: guard.clone(),
            overlay: BTreeMap::new(),
        };
        let result = op(&mut staged).await?;
        for ((ns, key), value) in staged.overlay {
            match value {
                Some(bytes) => {
                    guard
                        .entry(ns)
                        .or_insert_with(BTreeMap::new)
                        .insert(key, bytes);
                }
                None => {
                    if let Some(tree) = guard.get_mut(&ns) {
                        tree.remove(&key);
                    }
                }
            }
        }
        Ok(result)
    }
}

/// Overlay of staged writes on top of a snapshot of the committed state,
/// exactly as [`super::sled_store::SledTransaction`] stages writes on top of
/// its underlying trees.
struct MemoryTransaction {
    base: Namespaces,
    overlay: BTreeMap<(String, String), Option<Vec<u8>>>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn read_tx(&mut self, ns: &str, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.overlay.get(&(ns.to_string(), key.to_string())) {
            return Ok(staged.clone());
        }
        Ok(self.base.get(ns).and_then(|tree| tree.get(key).cloned()))
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
        let mut result: BTreeMap<String, Vec<u8>> = self
            .base
            .get(ns)
            .map(|tree| {
                tree.iter()
                    .filter(|(k, _)| k.starts_with(prefix))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
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
