// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-process [`KeyValueStore`] for tests and single-instance deployments.
//!
//! Keys are spread over independently locked shards so writers for
//! different addresses do not contend on one lock.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::kv::{KeyValueStore, StoreError, StoreResult};

const DEFAULT_SHARDS: usize = 16;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

type Shard = RwLock<HashMap<String, Entry>>;

pub struct MemoryStore {
    shards: Vec<Shard>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            shards: (0..DEFAULT_SHARDS)
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn read(&self, key: &str) -> StoreResult<RwLockReadGuard<'_, HashMap<String, Entry>>> {
        self.shard(key)
            .read()
            .map_err(|_| StoreError::Backend("shard lock poisoned".to_string()))
    }

    fn write(&self, key: &str) -> StoreResult<RwLockWriteGuard<'_, HashMap<String, Entry>>> {
        self.shard(key)
            .write()
            .map_err(|_| StoreError::Backend("shard lock poisoned".to_string()))
    }
}

fn entry(value: &[u8], ttl: Option<Duration>) -> Entry {
    Entry {
        value: value.to_vec(),
        // A TTL past the end of the monotonic clock never expires
        expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let shard = self.read(key)?;
        Ok(shard
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        self.write(key)?.insert(key.to_string(), entry(value, ttl));
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let now = Instant::now();
        let mut shard = self.write(key)?;
        let current = shard
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.as_slice());
        if current != expected {
            return Ok(false);
        }
        shard.insert(key.to_string(), entry(value, ttl));
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> StoreResult<bool> {
        let mut shard = self.write(key)?;
        match shard.get(key) {
            Some(e) if e.value == expected => {
                shard.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .write(key)?
            .remove(key)
            .is_some_and(|e| e.is_live(now)))
    }

    async fn purge_expired(&self, prefix: &str) -> StoreResult<usize> {
        let now = Instant::now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut map = shard
                .write()
                .map_err(|_| StoreError::Backend("shard lock poisoned".to_string()))?;
            let before = map.len();
            map.retain(|k, e| !k.starts_with(prefix) || e.is_live(now));
            removed += before - map.len();
        }
        Ok(removed)
    }
}
