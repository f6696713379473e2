// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet signature verification over challenge messages.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tracing::{debug, warn};

use crate::chain::{with_deadline, DidRecord, IdentityOracle};
use crate::crypto::recover_personal_sign_address;
use crate::error::BrokerResult;

/// Decode a hex signature with or without `0x`.
pub fn decode_signature(signature: &str) -> Option<Vec<u8>> {
    let trimmed = signature.trim();
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    alloy::hex::decode(raw).ok().filter(|bytes| !bytes.is_empty())
}

pub struct SignatureVerifier {
    oracle: Arc<dyn IdentityOracle>,
    timeout: Duration,
    allow_fallback: bool,
}

impl SignatureVerifier {
    pub fn new(oracle: Arc<dyn IdentityOracle>, timeout: Duration, allow_fallback: bool) -> Self {
        Self {
            oracle,
            timeout,
            allow_fallback,
        }
    }

    pub fn allows_fallback(&self) -> bool {
        self.allow_fallback
    }

    /// Verify `signature` over `message` for `address`.
    ///
    /// When the address has a DID the registry decides. Local personal_sign
    /// recovery is used for addresses without a DID, and for DID holders only
    /// when the registry cannot be reached and fallback is enabled.
    pub async fn verify(
        &self,
        address: Address,
        message: &str,
        signature: &[u8],
        did: Option<&DidRecord>,
    ) -> BrokerResult<bool> {
        if did.is_none() {
            return Ok(Self::verify_locally(address, message, signature));
        }

        let registry = with_deadline(
            "did registry",
            self.timeout,
            self.oracle.verify_signature(address, message, signature),
        )
        .await;

        match registry {
            Ok(valid) => Ok(valid),
            Err(e) if self.allow_fallback => {
                warn!(%address, error = %e, "Registry signature check failed, using local recovery");
                Ok(Self::verify_locally(address, message, signature))
            }
            Err(e) => Err(e),
        }
    }

    fn verify_locally(address: Address, message: &str, signature: &[u8]) -> bool {
        match recover_personal_sign_address(message.as_bytes(), signature) {
            Ok(recovered) => recovered == address,
            Err(e) => {
                debug!(%address, error = %e, "Signature recovery failed");
                false
            }
        }
    }
}
