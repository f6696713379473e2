// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Challenge-response sign-in and session endpoints.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};

use crate::auth::{bearer_token, Auth, AuthSession, AuthenticateRequest, Challenge};
use crate::error::BrokerError;
use crate::models::{ChallengeRequest, LogoutRequest, RefreshRequest, VerifyRequest};
use crate::state::AppState;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Caller origin for rate limiting.
///
/// The first `X-Forwarded-For` hop is used only when the deployment says a
/// trusted proxy sets it; otherwise clients could pick their own bucket.
/// Falls back to the peer address when the server runs with connect info.
pub struct ClientOrigin(pub Option<String>);

fn client_origin(parts: &Parts, trust_forwarded_for: bool) -> Option<String> {
    let forwarded = trust_forwarded_for
        .then(|| parts.headers.get(FORWARDED_FOR))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    forwarded.or_else(|| {
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}

impl FromRequestParts<AppState> for ClientOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(ClientOrigin(client_origin(parts, state.trust_forwarded_for)))
    }
}

/// Issue a sign-in challenge for a wallet address.
#[utoipa::path(
    post,
    path = "/v1/auth/challenge",
    tag = "Auth",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = Challenge),
        (status = 400, description = "Invalid address"),
    )
)]
pub async fn request_challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<Challenge>, BrokerError> {
    Ok(Json(state.auth.challenge(&request.address).await?))
}

/// Exchange a signed challenge for a session.
#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    tag = "Auth",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Session issued", body = AuthSession),
        (status = 401, description = "Invalid challenge, signature, or deactivated identity"),
        (status = 429, description = "Too many failed attempts"),
    )
)]
pub async fn verify_signature(
    State(state): State<AppState>,
    ClientOrigin(origin): ClientOrigin,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<AuthSession>, BrokerError> {
    let session = state
        .auth
        .authenticate(AuthenticateRequest {
            address: request.address,
            signature: request.signature,
            origin,
        })
        .await?;
    Ok(Json(session))
}

/// Exchange a refresh token for a new session.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Session renewed", body = AuthSession),
        (status = 401, description = "Invalid refresh token or deactivated identity"),
    )
)]
pub async fn refresh_session(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthSession>, BrokerError> {
    let session = state
        .auth
        .refresh(&request.refresh_token, request.address.as_deref())
        .await?;
    Ok(Json(session))
}

/// Revoke the presented access token (and optionally a refresh token).
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "Auth",
    security(("bearer" = [])),
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Tokens revoked"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Refresh token belongs to another address"),
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    Auth(user): Auth,
    headers: HeaderMap,
    Json(request): Json<LogoutRequest>,
) -> Result<StatusCode, BrokerError> {
    let access_token = bearer_token(&headers)?;
    state
        .auth
        .logout(&user.address, access_token, request.refresh_token.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
