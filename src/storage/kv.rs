// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key-value store abstraction with per-entry expiry.
//!
//! Challenges, revocation entries and rate-limit counters all live behind
//! this trait so several broker instances can share one backing store.
//! Writers that must not lose updates use [`KeyValueStore::compare_and_swap`]
//! instead of read-modify-write.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),

    /// A compare-and-swap loop gave up after repeated contention.
    #[error("write conflict on key '{0}'")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Current value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Unconditional write. `ttl = None` never expires.
    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()>;

    /// Atomically replace the value if it currently equals `expected`.
    ///
    /// `expected = None` means "only if absent or expired". Returns whether
    /// the write happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> StoreResult<bool>;

    /// Atomically delete the entry if it currently equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> StoreResult<bool>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Remove every expired entry under `prefix`, returning how many went.
    async fn purge_expired(&self, prefix: &str) -> StoreResult<usize>;
}

/// Read and decode a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StoreResult<Option<(T, Vec<u8>)>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some((serde_json::from_slice(&raw)?, raw))),
        None => Ok(None),
    }
}

/// Encode a value as JSON for storage.
pub fn to_json<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}
