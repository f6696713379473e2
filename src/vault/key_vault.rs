// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Lifecycle of per-record data-encryption keys and short-lived ephemeral
//! keys on top of a [`SecretStore`].
//!
//! Secret names:
//!
//! ```text
//! dek-{sanitized record id}           # one 256-bit key per record
//! eph-{sanitized purpose}-{uuid}      # time-boxed ephemeral secret
//! ```
//!
//! Store failures are reported as `VaultUnavailable` and never retried here.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use zeroize::Zeroizing;

use super::secret_store::{SecretStore, SecretStoreError};
use crate::crypto::{generate_symmetric_key, SYMMETRIC_KEY_LEN};
use crate::error::{BrokerError, BrokerResult};

/// A record's data-encryption key. Zeroized on drop and never printed.
#[derive(Clone)]
pub struct DataKey(Zeroizing<[u8; SYMMETRIC_KEY_LEN]>);

impl DataKey {
    fn from_slice(bytes: &[u8]) -> BrokerResult<Self> {
        if bytes.len() != SYMMETRIC_KEY_LEN {
            return Err(BrokerError::Internal(format!(
                "stored key has {} bytes, expected {SYMMETRIC_KEY_LEN}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(..)")
    }
}

/// Strip everything that is not ASCII alphanumeric.
pub fn sanitize_identifier(id: &str) -> String {
    id.chars().filter(char::is_ascii_alphanumeric).collect()
}

pub struct KeyVaultAdapter {
    store: Arc<dyn SecretStore>,
    timeout: Duration,
}

impl KeyVaultAdapter {
    pub fn new(store: Arc<dyn SecretStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Fetch the record's key, creating it on first use.
    ///
    /// Concurrent first accesses race on `create_secret`; the loser re-reads
    /// and returns the winner's key, so every caller sees the same key.
    pub async fn get_data_encryption_key(&self, record_id: &str) -> BrokerResult<DataKey> {
        let name = dek_name(record_id)?;

        match self.call(self.store.get_secret(&name)).await? {
            Ok(bytes) => return DataKey::from_slice(&bytes),
            Err(SecretStoreError::NotFound(_)) => {}
            Err(e) => return Err(vault_error(e)),
        }

        let fresh = generate_symmetric_key();
        let created = self
            .call(self.store.create_secret(&name, fresh.as_slice(), None))
            .await?
            .map_err(vault_error)?;
        if created {
            info!(secret = %name, "Created data encryption key");
            return Ok(DataKey(fresh));
        }

        let bytes = self
            .call(self.store.get_secret(&name))
            .await?
            .map_err(vault_error)?;
        DataKey::from_slice(&bytes)
    }

    /// Replace the record's key unconditionally. Ciphertext under the old
    /// key must be re-encrypted by the caller.
    pub async fn rotate_data_encryption_key(&self, record_id: &str) -> BrokerResult<DataKey> {
        let name = dek_name(record_id)?;
        let fresh = generate_symmetric_key();
        self.call(self.store.set_secret(&name, fresh.as_slice(), None))
            .await?
            .map_err(vault_error)?;
        info!(secret = %name, "Rotated data encryption key");
        Ok(DataKey(fresh))
    }

    /// Remove the record's key. Deleting a key that does not exist succeeds.
    pub async fn delete_data_encryption_key(&self, record_id: &str) -> BrokerResult<()> {
        let name = dek_name(record_id)?;
        match self.call(self.store.delete_secret(&name)).await? {
            Ok(()) | Err(SecretStoreError::NotFound(_)) => {
                info!(secret = %name, "Deleted data encryption key");
                Ok(())
            }
            Err(e) => Err(vault_error(e)),
        }
    }

    /// Store a time-boxed secret and return its handle.
    pub async fn store_ephemeral_key(
        &self,
        value: &[u8],
        ttl: Duration,
        purpose: &str,
    ) -> BrokerResult<String> {
        let purpose = sanitize_identifier(purpose);
        if purpose.is_empty() {
            return Err(BrokerError::InvalidRequest(
                "ephemeral key purpose is empty".to_string(),
            ));
        }
        let handle = format!("eph-{purpose}-{}", uuid::Uuid::new_v4().simple());
        self.call(self.store.set_secret(&handle, value, Some(ttl)))
            .await?
            .map_err(vault_error)?;
        Ok(handle)
    }

    /// Read an ephemeral secret; `None` once it has expired.
    pub async fn fetch_ephemeral_key(&self, handle: &str) -> BrokerResult<Option<Zeroizing<Vec<u8>>>> {
        if !handle.starts_with("eph-") {
            return Err(BrokerError::InvalidRequest(
                "not an ephemeral key handle".to_string(),
            ));
        }
        match self.call(self.store.get_secret(handle)).await? {
            Ok(value) => Ok(Some(value)),
            Err(SecretStoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(vault_error(e)),
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = T>) -> BrokerResult<T> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            warn!(timeout_ms = self.timeout.as_millis() as u64, "Secret store call timed out");
            BrokerError::UpstreamTimeout("secret store".to_string())
        })
    }
}

fn dek_name(record_id: &str) -> BrokerResult<String> {
    let sanitized = sanitize_identifier(record_id);
    if sanitized.is_empty() {
        return Err(BrokerError::InvalidRequest(
            "record identifier has no usable characters".to_string(),
        ));
    }
    Ok(format!("dek-{sanitized}"))
}

fn vault_error(e: SecretStoreError) -> BrokerError {
    warn!(error = %e, "Secret store operation failed");
    match e {
        SecretStoreError::InvalidName(name) => {
            BrokerError::InvalidRequest(format!("invalid secret name '{name}'"))
        }
        other => BrokerError::VaultUnavailable(other.to_string()),
    }
}
