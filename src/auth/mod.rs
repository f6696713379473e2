// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Wallet challenge-response authentication for the access broker.
//!
//! ## Auth Flow
//!
//! 1. Client requests a challenge for its address
//! 2. Wallet signs `"Sign this message to authenticate: <nonce>"` (EIP-191)
//! 3. Broker:
//!    - Verifies the signature (DID registry first when a DID exists)
//!    - Consumes the challenge exactly once
//!    - Resolves DID and role from the on-chain registry
//!    - Mints an access token and a refresh token
//! 4. Client sends `Authorization: Bearer <access token>`
//!
//! ## Security
//!
//! - Challenges are single use and expire
//! - Failed attempts are counted per address and per origin
//! - Access and refresh tokens use distinct signing secrets
//! - Revoked tokens are rejected until their natural expiry

pub mod challenge;
pub mod claims;
pub mod extractor;
pub mod identity;
pub mod rate_limit;
pub mod roles;
pub mod service;
pub mod signature;
pub mod tokens;

pub use challenge::{Challenge, ChallengeStore, CHALLENGE_PREFIX};
pub use claims::AuthenticatedUser;
pub use extractor::{bearer_token, Auth};
pub use identity::{normalize_address, IdentityResolver, ResolvedIdentity};
pub use rate_limit::{IdentifierKind, RateLimitPolicy, RateLimitStatus, RateLimiter};
pub use roles::{Role, RoleRanking};
pub use service::{AuthSession, AuthenticateRequest, AuthenticationService};
pub use signature::SignatureVerifier;
pub use tokens::{
    token_fingerprint, AccessClaims, RefreshClaims, SessionTokens, TokenRejection, TokenService,
    TokenSettings,
};
