// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Data Access Broker
//!
//! Turns a provider-held record into a copy only the requesting consumer can
//! read:
//!
//! ```text
//! authorize ─► fetch blob ─► DEK (fetch-or-create) ─► decrypt
//!           ─► re-encrypt payload ─► wrap key for consumer (ECIES)
//! ```
//!
//! Authorization happens before any blob or vault access. The plaintext and
//! the unwrapped key exist only in this process, in zeroizing buffers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use crate::auth::normalize_address;
use crate::blob::{validate_blob_ref, BlobStore};
use crate::chain::{with_deadline, AuthorizationOracle};
use crate::crypto::{
    encrypt_with_public_key, generate_symmetric_key, symmetric_decrypt, symmetric_encrypt,
    EciesEnvelope, PublicKey, SymmetricAlgorithm, SymmetricCiphertext,
};
use crate::error::{BrokerError, BrokerResult};
use crate::vault::KeyVaultAdapter;

const SESSION_KEY_PURPOSE: &str = "data-access";

/// Which key is wrapped for the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeMode {
    /// Wrap the record's DEK; the payload is re-encrypted under it.
    #[default]
    RecordKey,
    /// Wrap a fresh per-request key held briefly in the vault.
    SessionKey,
}

impl EnvelopeMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "record_key" => Some(EnvelopeMode::RecordKey),
            "session_key" => Some(EnvelopeMode::SessionKey),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataAccessRequest {
    /// Consumer's secp256k1 public key, hex SEC1.
    pub consumer_public_key: String,
    pub blob_ref: String,
    pub consumer_address: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DataAccessResponse {
    /// Payload encrypted under the wrapped key.
    pub encrypted_data: SymmetricCiphertext,
    /// The key, encrypted to the consumer's public key.
    pub encrypted_shared_secret: EciesEnvelope,
    /// Vault handle of the session key (session-key mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key_id: Option<String>,
}

pub struct DataAccessBroker {
    authz: Arc<dyn AuthorizationOracle>,
    blobs: Arc<dyn BlobStore>,
    vault: Arc<KeyVaultAdapter>,
    mode: EnvelopeMode,
    timeout: Duration,
    ephemeral_ttl: Duration,
}

impl DataAccessBroker {
    pub fn new(
        authz: Arc<dyn AuthorizationOracle>,
        blobs: Arc<dyn BlobStore>,
        vault: Arc<KeyVaultAdapter>,
        timeout: Duration,
    ) -> Self {
        Self {
            authz,
            blobs,
            vault,
            mode: EnvelopeMode::default(),
            timeout,
            ephemeral_ttl: Duration::from_secs(300),
        }
    }

    pub fn with_mode(mut self, mode: EnvelopeMode, ephemeral_ttl: Duration) -> Self {
        self.mode = mode;
        self.ephemeral_ttl = ephemeral_ttl;
        self
    }

    /// Authorization pre-flight only. A slow oracle is `UpstreamTimeout`,
    /// never `false`.
    pub async fn validate_consumer_access(&self, blob_ref: &str, address: &str) -> BrokerResult<bool> {
        validate_blob_ref(blob_ref).map_err(|e| BrokerError::InvalidRequest(e.to_string()))?;
        let (address, _) = normalize_address(address)?;
        with_deadline(
            "consent registry",
            self.timeout,
            self.authz.is_authorized(blob_ref, address),
        )
        .await
    }

    pub async fn process_data_access_request(
        &self,
        request: DataAccessRequest,
    ) -> BrokerResult<DataAccessResponse> {
        let consumer_key = PublicKey::parse(&request.consumer_public_key)?;
        if !consumer_key.curve().supports_encryption() {
            return Err(BrokerError::UnsupportedOperation(format!(
                "{:?} keys cannot receive encrypted data",
                consumer_key.curve()
            )));
        }

        if !self
            .validate_consumer_access(&request.blob_ref, &request.consumer_address)
            .await?
        {
            warn!(
                blob_ref = %request.blob_ref,
                consumer = %request.consumer_address.to_ascii_lowercase(),
                "Data access denied"
            );
            return Err(BrokerError::AccessDenied);
        }

        let blob = with_deadline("blob store", self.timeout, self.blobs.fetch(&request.blob_ref)).await?;
        debug!(blob_ref = %request.blob_ref, bytes = blob.len(), "Fetched record blob");

        let stored = SymmetricCiphertext::from_json_bytes(&blob).map_err(|e| {
            warn!(blob_ref = %request.blob_ref, error = %e, "Stored blob is not a ciphertext envelope");
            BrokerError::PayloadIntegrity
        })?;

        let dek = self.vault.get_data_encryption_key(&request.blob_ref).await?;
        let plaintext = symmetric_decrypt(&stored, dek.as_bytes())?;

        let (wrapped_key, session_key_id) = match self.mode {
            EnvelopeMode::RecordKey => (Zeroizing::new(dek.as_bytes().to_vec()), None),
            EnvelopeMode::SessionKey => {
                let key = generate_symmetric_key();
                let handle = self
                    .vault
                    .store_ephemeral_key(key.as_slice(), self.ephemeral_ttl, SESSION_KEY_PURPOSE)
                    .await?;
                (Zeroizing::new(key.to_vec()), Some(handle))
            }
        };

        let encrypted_data = symmetric_encrypt(&plaintext, &wrapped_key, stored.algorithm)?;
        let encrypted_shared_secret = encrypt_with_public_key(&wrapped_key, &consumer_key)?;

        info!(
            blob_ref = %request.blob_ref,
            consumer = %request.consumer_address.to_ascii_lowercase(),
            mode = ?self.mode,
            "Data access granted"
        );

        Ok(DataAccessResponse {
            encrypted_data,
            encrypted_shared_secret,
            session_key_id,
        })
    }

    /// Encrypt a payload under the record's key in the stored blob format.
    pub async fn seal_record(
        &self,
        record_id: &str,
        plaintext: &[u8],
        algorithm: SymmetricAlgorithm,
    ) -> BrokerResult<Vec<u8>> {
        let dek = self.vault.get_data_encryption_key(record_id).await?;
        let sealed = symmetric_encrypt(plaintext, dek.as_bytes(), algorithm)?;
        Ok(sealed.to_json_bytes()?)
    }

    /// Delete the record's key; stored ciphertext becomes unreadable.
    pub async fn tombstone_record(&self, record_id: &str) -> BrokerResult<()> {
        self.vault.delete_data_encryption_key(record_id).await?;
        info!(record_id, "Record tombstoned");
        Ok(())
    }
}
