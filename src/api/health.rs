// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

const HEALTH_KEY: &str = "health:ping";

/// Readiness response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub service: String,
    /// Challenge / revocation / rate-limit store.
    pub state_store: String,
    /// Chain RPC reachability (absent when no chain client is configured).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<String>,
}

/// Liveness response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn label(ok: bool) -> String {
    if ok { "ok" } else { "unavailable" }.to_string()
}

/// Liveness check. Always 200 while the process runs.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check. 503 if the state store or chain RPC is unreachable.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let store_ok = state.store.get(HEALTH_KEY).await.is_ok();

    let chain = match &state.chain {
        Some(chain) => {
            let reachable = tokio::time::timeout(state.readiness_timeout, chain.block_number())
                .await
                .is_ok_and(|r| r.is_ok());
            Some(reachable)
        }
        None => None,
    };

    let all_ok = store_ok && chain.unwrap_or(true);
    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            state_store: label(store_ok),
            chain: chain.map(label),
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
