// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User endpoints.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, AuthenticatedUser, Role};

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    /// Lower-cased wallet address
    pub address: String,
    /// Role resolved at sign-in
    pub role: Role,
    /// Registered DID, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    /// Access token expiry (Unix timestamp)
    pub expires_at: i64,
}

impl From<AuthenticatedUser> for UserMeResponse {
    fn from(user: AuthenticatedUser) -> Self {
        Self {
            address: user.address,
            role: user.role,
            did: user.did,
            expires_at: user.expires_at,
        }
    }
}

/// Get the current session's identity.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session identity", body = UserMeResponse),
        (status = 401, description = "Missing, invalid or revoked token"),
    )
)]
pub async fn get_current_user(Auth(user): Auth) -> Json<UserMeResponse> {
    Json(user.into())
}
