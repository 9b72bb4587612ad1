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

//! Status-List Index Allocator: a pre-shuffled permutation of `1..L` plus a
//! monotonic cursor, giving out one revocation index per revocable
//! credential. Index 0 is never allocated — it doubles as the "no index
//! assigned" sentinel used by [`crate::application::datatypes::CredentialStatusRef::index`].

use crate::application::status_list::bitstring::LIST_LENGTH;
use crate::error::{Error, Result};
use crate::storage::{Storage, Transaction, WriteOp};
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const NS_STATUS_LIST_INDEX: &str = "status-list-index";
const KEY_PERMUTATION: &str = "status-list-indexes";
const KEY_CURSOR: &str = "current-list-index";

#[derive(Debug, Serialize, Deserialize)]
struct Cursor {
    index: u32,
}

#[derive(Clone)]
pub struct StatusListIndexAllocator {
    storage: Arc<dyn Storage>,
}

impl StatusListIndexAllocator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        StatusListIndexAllocator { storage }
    }

    /// Runs once per process lifetime. Gates on pre-existence of the
    /// permutation key — a second call, or a call against a store that
    /// already has a permutation from a prior process, is a no-op rather
    /// than resetting the cursor to 0.
    pub async fn init(&self) -> Result<()> {
        if self
            .storage
            .read(NS_STATUS_LIST_INDEX, KEY_PERMUTATION)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let mut permutation: Vec<u32> = (1..LIST_LENGTH as u32).collect();
        permutation.shuffle(&mut thread_rng());

        self.storage
            .write(
                NS_STATUS_LIST_INDEX,
                KEY_PERMUTATION,
                serde_json::to_vec(&permutation)?,
            )
            .await?;
        self.storage
            .write(
                NS_STATUS_LIST_INDEX,
                KEY_CURSOR,
                serde_json::to_vec(&Cursor { index: 0 })?,
            )
            .await?;
        Ok(())
    }

    async fn read_permutation(&self, tx: &mut (dyn Transaction + Send)) -> Result<Vec<u32>> {
        let bytes = tx
            .read_tx(NS_STATUS_LIST_INDEX, KEY_PERMUTATION)
            .await?
            .ok_or_else(|| Error::Invalid("status list index pool not initialized".to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn read_cursor(&self, tx: &mut (dyn Transaction + Send)) -> Result<Cursor> {
        let bytes = tx
            .read_tx(NS_STATUS_LIST_INDEX, KEY_CURSOR)
            .await?
            .ok_or_else(|| Error::Invalid("status list index pool not initialized".to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Returns `permutation[cursor]` without advancing. Pure read.
    pub async fn next_index(&self, tx: &mut (dyn Transaction + Send)) -> Result<u32> {
        let permutation = self.read_permutation(tx).await?;
        let cursor = self.read_cursor(tx).await?;
        permutation
            .get(cursor.index as usize)
            .copied()
            .ok_or(Error::Exhausted)
    }

    /// Advances the cursor by one, failing with [`Error::Exhausted`] once
    /// the permutation is spent.
    pub async fn increment(&self, tx: &mut (dyn Transaction + Send)) -> Result<()> {
        let permutation = self.read_permutation(tx).await?;
        let cursor = self.read_cursor(tx).await?;
        let next = cursor.index + 1;
        if next as usize > permutation.len() {
            return Err(Error::Exhausted);
        }
        tx.write_tx(
            NS_STATUS_LIST_INDEX,
            KEY_CURSOR,
            serde_json::to_vec(&Cursor { index: next })?,
        )
        .await
    }

    /// Same outcome as [`Self::increment`], but returns the write as a
    /// prepared [`WriteOp`] instead of performing it, so callers can bundle
    /// it into a larger `write_many` batch.
    pub async fn get_increment_write(
        &self,
        tx: &mut (dyn Transaction + Send),
    ) -> Result<WriteOp> {
        let permutation = self.read_permutation(tx).await?;
        let cursor = self.read_cursor(tx).await?;
        let next = cursor.index + 1;
        if next as usize > permutation.len() {
            return Err(Error::Exhausted);
        }
        Ok(WriteOp::new(
            NS_STATUS_LIST_INDEX,
            KEY_CURSOR,
            serde_json::to_vec(&Cursor { index: next })?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[tokio::test]
    async fn init_is_idempotent_and_does_not_reset_cursor() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let allocator = StatusListIndexAllocator::new(storage.clone());
        allocator.init().await.unwrap();

        storage
            .execute(Box::new(|tx| {
                Box::pin(async move {
                    tx.write_tx(
                        NS_STATUS_LIST_INDEX,
                        KEY_CURSOR,
                        serde_json::to_vec(&Cursor { index: 5 }).unwrap(),
                    )
                    .await?;
                    Ok(Vec::new())
                })
            }))
            .await
            .unwrap();

        allocator.init().await.unwrap();

        storage
            .execute(Box::new(|tx| {
                Box::pin(async move {
                    let cursor_bytes = tx.read_tx(NS_STATUS_LIST_INDEX, KEY_CURSOR).await?.unwrap();
                    let cursor: Cursor = serde_json::from_slice(&cursor_bytes).unwrap();
                    assert_eq!(cursor.index, 5);
                    Ok(Vec::new())
                })
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn next_index_does_not_advance_cursor() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let allocator = StatusListIndexAllocator::new(storage.clone());
        allocator.init().await.unwrap();

        storage
            .execute(Box::new(move |tx| {
                Box::pin(async move {
                    let first = allocator.next_index(tx).await?;
                    let second = allocator.next_index(tx).await?;
                    assert_eq!(first, second);
                    allocator.increment(tx).await?;
                    let third = allocator.next_index(tx).await?;
                    assert_ne!(first, third);
                    Ok(Vec::new())
                })
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn never_allocates_index_zero() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let allocator = StatusListIndexAllocator::new(storage.clone());
        allocator.init().await.unwrap();

        storage
            .execute(Box::new(|tx| {
                Box::pin(async move {
                    let permutation_bytes =
                        tx.read_tx(NS_STATUS_LIST_INDEX, KEY_PERMUTATION).await?.unwrap();
                    let permutation: Vec<u32> = serde_json::from_slice(&permutation_bytes).unwrap();
                    assert!(!permutation.contains(&0));
                    assert_eq!(permutation.len(), LIST_LENGTH - 1);
                    Ok(Vec::new())
                })
            }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn increment_fails_once_exhausted() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let allocator = StatusListIndexAllocator::new(storage.clone());
        allocator.init().await.unwrap();
        storage
            .execute(Box::new(|tx| {
                Box::pin(async move {
                    tx.write_tx(
                        NS_STATUS_LIST_INDEX,
                        KEY_CURSOR,
                        serde_json::to_vec(&Cursor {
                            index: (LIST_LENGTH - 1) as u32,
                        })
                        .unwrap(),
                    )
                    .await?;
                    Ok(Vec::new())
                })
            }))
            .await
            .unwrap();

        let result = storage
            .execute(Box::new(move |tx| {
                Box::pin(async move { allocator.increment(tx).await.map(|_| Vec::new()) })
            }))
            .await;
        assert!(matches!(result, Err(Error::Exhausted)));
    }

    #[tokio::test]
    async fn get_increment_write_returns_prepared_op_without_writing() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let allocator = StatusListIndexAllocator::new(storage.clone());
        allocator.init().await.unwrap();

        storage
            .execute(Box::new(move |tx| {
                Box::pin(async move {
                    let op = allocator.get_increment_write(tx).await?;
                    let cursor: Cursor = serde_json::from_slice(&op.value).unwrap();
                    assert_eq!(cursor.index, 1);
                    // the prepared op has not been applied to tx yet
                    let cursor_now: Cursor =
                        serde_json::from_slice(&tx.read_tx(&op.namespace, &op.key).await?.unwrap())
                            .unwrap();
                    assert_eq!(cursor_now.index, 0);
                    Ok(Vec::new())
                })
            }))
            .await
            .unwrap();
    }
}
