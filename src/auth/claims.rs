// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated caller representation.

use serde::Serialize;
use utoipa::ToSchema;

use super::roles::Role;
use super::tokens::AccessClaims;
use crate::error::BrokerError;

/// Caller identity after access-token verification.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Lower-cased wallet address (token subject).
    pub address: String,

    /// Role resolved from on-chain credentials at mint time.
    pub role: Role,

    pub did: Option<String>,

    /// Access token id (jti).
    pub token_id: String,

    /// Token expiration (Unix timestamp).
    pub expires_at: i64,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: AccessClaims) -> Self {
        Self {
            address: claims.sub,
            role: claims.role,
            did: claims.did,
            token_id: claims.jti,
            expires_at: claims.exp,
        }
    }

    /// `Unauthorized` unless the session holds `required` (or is Admin).
    pub fn require_role(&self, required: Role) -> Result<(), BrokerError> {
        if self.role.has_privilege(required) {
            Ok(())
        } else {
            Err(BrokerError::Unauthorized)
        }
    }
}
