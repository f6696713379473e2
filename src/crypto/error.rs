// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Cryptographic error type.

use thiserror::Error;

/// Errors raised by the primitives in [`crate::crypto`].
///
/// Decryption failures deliberately carry no detail: a wrong key and a
/// tampered ciphertext are indistinguishable to the caller.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The curve/algorithm combination does not support the operation.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed (wrong key or tampered data)")]
    Decryption,

    #[error("invalid encoding: {0}")]
    Encoding(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
