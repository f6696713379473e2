// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-only on-chain oracles consulted by authentication and the broker.

use alloy::primitives::{keccak256, Address, B256};
use async_trait::async_trait;

/// A DID registered for a controller address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DidRecord {
    pub did: String,
    pub active: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Contract error: {0}")]
    Contract(String),
}

/// DID and role registry.
#[async_trait]
pub trait IdentityOracle: Send + Sync {
    /// The DID controlled by `address`, if any.
    async fn resolve_did(&self, address: Address) -> Result<Option<DidRecord>, OracleError>;

    async fn has_role(&self, did: &str, role_id: B256) -> Result<bool, OracleError>;

    /// Check `signature` over `message` against the key material registered
    /// for `address`.
    async fn verify_signature(
        &self,
        address: Address,
        message: &str,
        signature: &[u8],
    ) -> Result<bool, OracleError>;
}

/// Consent / payment registry.
#[async_trait]
pub trait AuthorizationOracle: Send + Sync {
    async fn is_authorized(&self, blob_ref: &str, address: Address) -> Result<bool, OracleError>;
}

/// On-chain role identifier: `keccak256("<NAME>_ROLE")`.
pub fn role_id(name: &str) -> B256 {
    keccak256(format!("{}_ROLE", name.to_ascii_uppercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_ids_are_keccak_of_role_name() {
        assert_eq!(role_id("producer"), keccak256("PRODUCER_ROLE"));
        assert_eq!(role_id("Consumer"), role_id("CONSUMER"));
        assert_ne!(role_id("consumer"), role_id("provider"));
    }
}
