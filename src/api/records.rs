// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Producer record endpoints: seal a payload under its record key, or
//! tombstone the record by deleting that key.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::info;
use zeroize::Zeroizing;

use crate::auth::{Auth, Role};
use crate::crypto::SymmetricCiphertext;
use crate::error::BrokerError;
use crate::models::SealRecordRequest;
use crate::state::AppState;

/// Encrypt a payload into the stored blob format.
#[utoipa::path(
    post,
    path = "/v1/records/{record_id}/seal",
    tag = "Records",
    security(("bearer" = [])),
    params(("record_id" = String, Path, description = "Record identifier")),
    request_body = SealRecordRequest,
    responses(
        (status = 200, description = "Sealed blob, ready for upload", body = SymmetricCiphertext),
        (status = 400, description = "Payload is not base64 or record id is unusable"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not a producer"),
        (status = 503, description = "Vault unavailable"),
    )
)]
pub async fn seal_record(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(record_id): Path<String>,
    Json(body): Json<SealRecordRequest>,
) -> Result<impl IntoResponse, BrokerError> {
    user.require_role(Role::Producer)?;
    let plaintext = BASE64
        .decode(body.data.as_bytes())
        .map(Zeroizing::new)
        .map_err(|e| BrokerError::InvalidRequest(format!("data is not base64: {e}")))?;

    let blob = state
        .broker
        .seal_record(&record_id, &plaintext, body.algorithm)
        .await?;
    info!(record_id = %record_id, producer = %user.address, "Record sealed");
    Ok(([(header::CONTENT_TYPE, "application/json")], blob))
}

/// Delete the record key. Stored ciphertext becomes unreadable.
#[utoipa::path(
    delete,
    path = "/v1/records/{record_id}",
    tag = "Records",
    security(("bearer" = [])),
    params(("record_id" = String, Path, description = "Record identifier")),
    responses(
        (status = 204, description = "Record tombstoned"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not a producer"),
        (status = 503, description = "Vault unavailable"),
    )
)]
pub async fn tombstone_record(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(record_id): Path<String>,
) -> Result<StatusCode, BrokerError> {
    user.require_role(Role::Producer)?;
    state.broker.tombstone_record(&record_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
