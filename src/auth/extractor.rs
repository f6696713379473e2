// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractor for authenticated users.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::debug;

use super::claims::AuthenticatedUser;
use super::tokens::token_fingerprint;
use crate::error::BrokerError;
use crate::state::AppState;

/// Bearer token from the Authorization header, if any.
///
/// A header that is present but not a bearer credential is `InvalidToken`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, BrokerError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(BrokerError::MissingToken)?
        .to_str()
        .map_err(|_| BrokerError::InvalidToken)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(BrokerError::InvalidToken)
}

/// Extractor for a caller holding a valid, unrevoked access token.
pub struct Auth(pub AuthenticatedUser);

impl FromRequestParts<AppState> for Auth {
    type Rejection = BrokerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;

        let claims = state.tokens.verify_access(token).await.map_err(|rejection| {
            debug!(token = %token_fingerprint(token), reason = %rejection, "Access token rejected");
            rejection.into_access_error()
        })?;

        Ok(Auth(AuthenticatedUser::from_claims(claims)))
    }
}
