// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the HTTP adapter. Service-level results
//! ([`AuthSession`](crate::auth::AuthSession),
//! [`DataAccessResponse`](crate::broker::DataAccessResponse),
//! [`Challenge`](crate::auth::Challenge)) are returned as-is.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::crypto::SymmetricAlgorithm;

// =============================================================================
// Authentication
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    /// Wallet address (0x-prefixed, 40 hex characters).
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub address: String,
    /// Hex personal_sign signature over the challenge message.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
    /// If present, must match the refresh token subject.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LogoutRequest {
    /// Also revoke this refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

// =============================================================================
// Data Access
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DataAccessBody {
    /// Consumer secp256k1 public key, hex SEC1 (compressed or uncompressed).
    pub consumer_public_key: String,
    pub blob_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ValidateAccessResponse {
    pub blob_ref: String,
    pub authorized: bool,
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SealRecordRequest {
    /// Base64 plaintext payload.
    pub data: String,
    #[serde(default)]
    pub algorithm: SymmetricAlgorithm,
}
