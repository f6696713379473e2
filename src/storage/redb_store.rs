// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded [`KeyValueStore`] backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `kv`: key → `expires_at_ms (u64 BE, 0 = never) || payload`
//!
//! Every compare-and-swap runs inside a single write transaction, so
//! updates are serialized by redb's writer lock and never lost.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::kv::{KeyValueStore, StoreError, StoreResult};

const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

const HEADER_LEN: usize = 8;

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn frame(value: &[u8], ttl: Option<Duration>) -> Vec<u8> {
    let expires_at = ttl
        .map(|ttl| now_ms().saturating_add(ttl.as_millis() as u64).max(1))
        .unwrap_or(0);
    let mut framed = Vec::with_capacity(HEADER_LEN + value.len());
    framed.extend_from_slice(&expires_at.to_be_bytes());
    framed.extend_from_slice(value);
    framed
}

/// Split a stored value into `(expires_at_ms, payload)`.
fn unframe(raw: &[u8]) -> StoreResult<(u64, &[u8])> {
    if raw.len() < HEADER_LEN {
        return Err(StoreError::Backend("truncated value header".to_string()));
    }
    let (header, payload) = raw.split_at(HEADER_LEN);
    let mut expires = [0u8; HEADER_LEN];
    expires.copy_from_slice(header);
    Ok((u64::from_be_bytes(expires), payload))
}

fn is_live(expires_at: u64, now: u64) -> bool {
    expires_at == 0 || expires_at > now
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(backend)?;
        }
        let db = Database::create(path).map_err(backend)?;

        // Pre-create the table so read transactions never fail on a fresh file
        let write_txn = db.begin_write().map_err(backend)?;
        {
            let _ = write_txn.open_table(KV).map_err(backend)?;
        }
        write_txn.commit().map_err(backend)?;

        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
    }
}

#[async_trait]
impl KeyValueStore for RedbStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(backend)?;
            let table = read_txn.open_table(KV).map_err(backend)?;
            match table.get(key.as_str()).map_err(backend)? {
                Some(raw) => {
                    let (expires_at, payload) = unframe(raw.value())?;
                    Ok(is_live(expires_at, now_ms()).then(|| payload.to_vec()))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let key = key.to_string();
        let framed = frame(value, ttl);
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(backend)?;
            {
                let mut table = write_txn.open_table(KV).map_err(backend)?;
                table
                    .insert(key.as_str(), framed.as_slice())
                    .map_err(backend)?;
            }
            write_txn.commit().map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let key = key.to_string();
        let expected = expected.map(<[u8]>::to_vec);
        let framed = frame(value, ttl);
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(backend)?;
            let swapped = {
                let mut table = write_txn.open_table(KV).map_err(backend)?;
                let current = match table.get(key.as_str()).map_err(backend)? {
                    Some(raw) => {
                        let (expires_at, payload) = unframe(raw.value())?;
                        is_live(expires_at, now_ms()).then(|| payload.to_vec())
                    }
                    None => None,
                };
                if current == expected {
                    table
                        .insert(key.as_str(), framed.as_slice())
                        .map_err(backend)?;
                    true
                } else {
                    false
                }
            };
            if swapped {
                write_txn.commit().map_err(backend)?;
            } else {
                write_txn.abort().map_err(backend)?;
            }
            Ok(swapped)
        })
        .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> StoreResult<bool> {
        let key = key.to_string();
        let expected = expected.to_vec();
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(backend)?;
            let deleted = {
                let mut table = write_txn.open_table(KV).map_err(backend)?;
                let matches = match table.get(key.as_str()).map_err(backend)? {
                    Some(raw) => unframe(raw.value())?.1 == expected.as_slice(),
                    None => false,
                };
                if matches {
                    table.remove(key.as_str()).map_err(backend)?;
                }
                matches
            };
            write_txn.commit().map_err(backend)?;
            Ok(deleted)
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let key = key.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(backend)?;
            let was_live = {
                let mut table = write_txn.open_table(KV).map_err(backend)?;
                let removed = table.remove(key.as_str()).map_err(backend)?;
                match removed {
                    Some(raw) => is_live(unframe(raw.value())?.0, now_ms()),
                    None => false,
                }
            };
            write_txn.commit().map_err(backend)?;
            Ok(was_live)
        })
        .await
    }

    async fn purge_expired(&self, prefix: &str) -> StoreResult<usize> {
        let prefix = prefix.to_string();
        self.blocking(move |db| {
            let now = now_ms();
            let write_txn = db.begin_write().map_err(backend)?;
            let removed = {
                let mut table = write_txn.open_table(KV).map_err(backend)?;
                let mut expired = Vec::new();
                for item in table.range(prefix.as_str()..).map_err(backend)? {
                    let (key, raw) = item.map_err(backend)?;
                    let key = key.value();
                    if !key.starts_with(prefix.as_str()) {
                        break;
                    }
                    if !is_live(unframe(raw.value())?.0, now) {
                        expired.push(key.to_string());
                    }
                }
                for key in &expired {
                    table.remove(key.as_str()).map_err(backend)?;
                }
                expired.len()
            };
            write_txn.commit().map_err(backend)?;
            Ok(removed)
        })
        .await
    }
}
