// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Record access endpoints. The consumer address is always the token
//! subject, never taken from the body.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::auth::Auth;
use crate::broker::{DataAccessRequest, DataAccessResponse};
use crate::error::BrokerError;
use crate::models::{DataAccessBody, ValidateAccessResponse};
use crate::state::AppState;

/// Re-encrypt a record for the caller.
#[utoipa::path(
    post,
    path = "/v1/data/access",
    tag = "Data",
    security(("bearer" = [])),
    request_body = DataAccessBody,
    responses(
        (status = 200, description = "Record re-encrypted for the caller", body = DataAccessResponse),
        (status = 400, description = "Invalid key or blob reference"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Access not granted"),
        (status = 503, description = "Registry, blob store or vault unavailable"),
    )
)]
pub async fn request_data_access(
    State(state): State<AppState>,
    Auth(user): Auth,
    Json(body): Json<DataAccessBody>,
) -> Result<Json<DataAccessResponse>, BrokerError> {
    let response = state
        .broker
        .process_data_access_request(DataAccessRequest {
            consumer_public_key: body.consumer_public_key,
            blob_ref: body.blob_ref,
            consumer_address: user.address,
        })
        .await?;
    Ok(Json(response))
}

/// Check whether the caller has been granted access to a record.
#[utoipa::path(
    get,
    path = "/v1/data/access/{blob_ref}/validate",
    tag = "Data",
    security(("bearer" = [])),
    params(("blob_ref" = String, Path, description = "Blob reference")),
    responses(
        (status = 200, description = "Authorization result", body = ValidateAccessResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Consent registry unavailable"),
    )
)]
pub async fn validate_data_access(
    State(state): State<AppState>,
    Auth(user): Auth,
    Path(blob_ref): Path<String>,
) -> Result<Json<ValidateAccessResponse>, BrokerError> {
    let authorized = state
        .broker
        .validate_consumer_access(&blob_ref, &user.address)
        .await?;
    Ok(Json(ValidateAccessResponse {
        blob_ref,
        authorized,
    }))
}
