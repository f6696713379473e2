// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Broker error taxonomy and its HTTP mapping.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::storage::StoreError;

/// Every failure a broker operation can surface to its caller.
///
/// Messages are stable and safe to render. Variants that carry a `String`
/// hold upstream detail for logs only; it never reaches the response body.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("No valid challenge for this address")]
    InvalidChallenge,

    #[error("Signature does not match the challenge")]
    InvalidSignature,

    #[error("Identity is deactivated")]
    DeactivatedUser,

    #[error("Authorization header is required")]
    MissingToken,

    #[error("Token is invalid or expired")]
    InvalidToken,

    #[error("Refresh token is invalid or expired")]
    InvalidRefreshToken,

    #[error("Insufficient permissions for this operation")]
    Unauthorized,

    #[error("Access to this record has not been granted")]
    AccessDenied,

    #[error("Key vault unavailable")]
    VaultUnavailable(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Upstream service timed out")]
    UpstreamTimeout(String),

    #[error("Too many attempts, retry in {retry_after_secs}s")]
    TooManyAttempts { retry_after_secs: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream service unavailable")]
    UpstreamUnavailable(String),

    #[error("Stored payload failed integrity check")]
    PayloadIntegrity,

    #[error("Internal error")]
    Internal(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: String,
}

impl BrokerError {
    /// Stable snake_case identifier.
    pub fn error_code(&self) -> &'static str {
        match self {
            BrokerError::InvalidChallenge => "invalid_challenge",
            BrokerError::InvalidSignature => "invalid_signature",
            BrokerError::DeactivatedUser => "deactivated_user",
            BrokerError::MissingToken => "missing_token",
            BrokerError::InvalidToken => "invalid_token",
            BrokerError::InvalidRefreshToken => "invalid_refresh_token",
            BrokerError::Unauthorized => "unauthorized",
            BrokerError::AccessDenied => "access_denied",
            BrokerError::VaultUnavailable(_) => "vault_unavailable",
            BrokerError::UnsupportedOperation(_) => "unsupported_operation",
            BrokerError::UpstreamTimeout(_) => "upstream_timeout",
            BrokerError::TooManyAttempts { .. } => "too_many_attempts",
            BrokerError::InvalidRequest(_) => "invalid_request",
            BrokerError::UpstreamUnavailable(_) => "upstream_unavailable",
            BrokerError::PayloadIntegrity => "payload_integrity",
            BrokerError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BrokerError::InvalidChallenge
            | BrokerError::InvalidSignature
            | BrokerError::DeactivatedUser
            | BrokerError::MissingToken
            | BrokerError::InvalidToken
            | BrokerError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            BrokerError::Unauthorized | BrokerError::AccessDenied => StatusCode::FORBIDDEN,
            BrokerError::VaultUnavailable(_)
            | BrokerError::UpstreamTimeout(_)
            | BrokerError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            BrokerError::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            BrokerError::InvalidRequest(_) | BrokerError::UnsupportedOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            BrokerError::PayloadIntegrity | BrokerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Upstream detail kept out of the response body.
    fn log_detail(&self) -> Option<&str> {
        match self {
            BrokerError::VaultUnavailable(detail)
            | BrokerError::UpstreamTimeout(detail)
            | BrokerError::UpstreamUnavailable(detail)
            | BrokerError::Internal(detail) => Some(detail),
            _ => None,
        }
    }
}

impl From<CryptoError> for BrokerError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::UnsupportedOperation(msg) => BrokerError::UnsupportedOperation(msg),
            CryptoError::InvalidKey(msg) | CryptoError::Encoding(msg) => {
                BrokerError::InvalidRequest(msg)
            }
            CryptoError::Decryption => BrokerError::PayloadIntegrity,
            other => BrokerError::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for BrokerError {
    fn from(e: StoreError) -> Self {
        BrokerError::UpstreamUnavailable(format!("state store: {e}"))
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Some(detail) = self.log_detail() {
            tracing::warn!(
                error_code = self.error_code(),
                status = status.as_u16(),
                detail,
                "Request failed"
            );
        }

        let retry_after = match &self {
            BrokerError::TooManyAttempts { retry_after_secs } => {
                HeaderValue::from_str(&retry_after_secs.to_string()).ok()
            }
            _ => None,
        };

        let body = Json(ErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
