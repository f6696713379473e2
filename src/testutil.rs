// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test doubles for the broker's upstream collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::blob::{BlobStore, BlobStoreError};
use crate::chain::{parse_address, AuthorizationOracle, DidRecord, IdentityOracle, OracleError};
use crate::storage::{KeyValueStore, StoreError, StoreResult};
use crate::vault::{SecretStore, SecretStoreError, SecretStoreResult};

pub const ADDRESS_A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn address(value: &str) -> Address {
    parse_address(value).unwrap()
}

/// Configurable DID/role registry.
#[derive(Default)]
pub struct MockIdentityOracle {
    dids: HashMap<Address, DidRecord>,
    roles: HashSet<(String, B256)>,
    registry_signature_result: bool,
    failing: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockIdentityOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_did(mut self, controller: &str, did: &str, active: bool) -> Self {
        self.dids.insert(
            address(controller),
            DidRecord {
                did: did.to_string(),
                active,
            },
        );
        self
    }

    pub fn with_role(mut self, did: &str, role_id: B256) -> Self {
        self.roles.insert((did.to_string(), role_id));
        self
    }

    pub fn with_registry_signature_result(mut self, valid: bool) -> Self {
        self.registry_signature_result = valid;
        self
    }

    /// Every call fails with an RPC error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(OracleError::Rpc("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityOracle for MockIdentityOracle {
    async fn resolve_did(&self, address: Address) -> Result<Option<DidRecord>, OracleError> {
        self.enter().await?;
        Ok(self.dids.get(&address).cloned())
    }

    async fn has_role(&self, did: &str, role_id: B256) -> Result<bool, OracleError> {
        self.enter().await?;
        Ok(self.roles.contains(&(did.to_string(), role_id)))
    }

    async fn verify_signature(
        &self,
        _address: Address,
        _message: &str,
        _signature: &[u8],
    ) -> Result<bool, OracleError> {
        self.enter().await?;
        Ok(self.registry_signature_result)
    }
}

/// Consent registry with grants added at runtime.
#[derive(Default)]
pub struct MockAuthorizationOracle {
    grants: Mutex<HashSet<(String, Address)>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockAuthorizationOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, blob_ref: &str, consumer: &str) {
        self.grants
            .lock()
            .unwrap()
            .insert((blob_ref.to_string(), address(consumer)));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationOracle for MockAuthorizationOracle {
    async fn is_authorized(&self, blob_ref: &str, address: Address) -> Result<bool, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .grants
            .lock()
            .unwrap()
            .contains(&(blob_ref.to_string(), address)))
    }
}

/// In-memory blob store counting fetches.
#[derive(Default)]
pub struct MockBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, blob_ref: &str, bytes: Vec<u8>) {
        self.blobs.lock().unwrap().insert(blob_ref.to_string(), bytes);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn fetch(&self, blob_ref: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.blobs
            .lock()
            .unwrap()
            .get(blob_ref)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(blob_ref.to_string()))
    }
}

/// Wraps a secret store and counts calls and successful creates.
pub struct CountingSecretStore {
    inner: Box<dyn SecretStore>,
    calls: AtomicUsize,
    creates_won: AtomicUsize,
}

impl CountingSecretStore {
    pub fn new(inner: impl SecretStore + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            calls: AtomicUsize::new(0),
            creates_won: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn creates_won(&self) -> usize {
        self.creates_won.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretStore for CountingSecretStore {
    async fn get_secret(&self, name: &str) -> SecretStoreResult<Zeroizing<Vec<u8>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_secret(name).await
    }

    async fn set_secret(&self, name: &str, value: &[u8], ttl: Option<Duration>) -> SecretStoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_secret(name, value, ttl).await
    }

    async fn create_secret(
        &self,
        name: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> SecretStoreResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let created = self.inner.create_secret(name, value, ttl).await?;
        if created {
            self.creates_won.fetch_add(1, Ordering::SeqCst);
        }
        Ok(created)
    }

    async fn delete_secret(&self, name: &str) -> SecretStoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_secret(name).await
    }
}

/// Secret store whose backend is down.
pub struct UnavailableSecretStore;

#[async_trait]
impl SecretStore for UnavailableSecretStore {
    async fn get_secret(&self, _name: &str) -> SecretStoreResult<Zeroizing<Vec<u8>>> {
        Err(SecretStoreError::Unavailable("backend down".into()))
    }

    async fn set_secret(&self, _name: &str, _value: &[u8], _ttl: Option<Duration>) -> SecretStoreResult<()> {
        Err(SecretStoreError::Unavailable("backend down".into()))
    }

    async fn create_secret(
        &self,
        _name: &str,
        _value: &[u8],
        _ttl: Option<Duration>,
    ) -> SecretStoreResult<bool> {
        Err(SecretStoreError::Unavailable("backend down".into()))
    }

    async fn delete_secret(&self, _name: &str) -> SecretStoreResult<()> {
        Err(SecretStoreError::Unavailable("backend down".into()))
    }
}

/// Key-value store whose backend is down.
pub struct FailingStore;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("backend down".into()))
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<Vec<u8>>> {
        down()
    }

    async fn put(&self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> StoreResult<()> {
        down()
    }

    async fn compare_and_swap(
        &self,
        _key: &str,
        _expected: Option<&[u8]>,
        _value: &[u8],
        _ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        down()
    }

    async fn compare_and_delete(&self, _key: &str, _expected: &[u8]) -> StoreResult<bool> {
        down()
    }

    async fn delete(&self, _key: &str) -> StoreResult<bool> {
        down()
    }

    async fn purge_expired(&self, _prefix: &str) -> StoreResult<usize> {
        down()
    }
}

/// In-memory store that records the TTL of every write and the outcome of
/// every purge.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: crate::storage::MemoryStore,
    writes: Mutex<Vec<(String, Option<Duration>)>>,
    purges: Mutex<Vec<(String, usize)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl_of_write(&self, prefix: &str) -> Option<Option<Duration>> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .find(|(key, _)| key.starts_with(prefix))
            .map(|(_, ttl)| *ttl)
    }

    pub fn purged(&self, prefix: &str) -> usize {
        self.purges
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == prefix)
            .map(|(_, n)| n)
            .sum()
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        self.writes.lock().unwrap().push((key.to_string(), ttl));
        self.inner.put(key, value, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        self.writes.lock().unwrap().push((key.to_string(), ttl));
        self.inner.compare_and_swap(key, expected, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> StoreResult<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.inner.delete(key).await
    }

    async fn purge_expired(&self, prefix: &str) -> StoreResult<usize> {
        let purged = self.inner.purge_expired(prefix).await?;
        self.purges.lock().unwrap().push((prefix.to_string(), purged));
        Ok(purged)
    }
}
