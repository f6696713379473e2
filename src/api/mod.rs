// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{AuthSession, Challenge, Role, SessionTokens},
    broker::DataAccessResponse,
    crypto::{EciesEnvelope, SymmetricAlgorithm, SymmetricCiphertext},
    models::{
        ChallengeRequest, DataAccessBody, LogoutRequest, RefreshRequest, SealRecordRequest,
        ValidateAccessResponse, VerifyRequest,
    },
    state::AppState,
};

pub mod auth;
pub mod data;
pub mod health;
pub mod records;
pub mod users;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/auth/challenge", post(auth::request_challenge))
        .route("/auth/verify", post(auth::verify_signature))
        .route("/auth/refresh", post(auth::refresh_session))
        .route("/auth/logout", post(auth::logout))
        .route("/users/me", get(users::get_current_user))
        .route("/data/access", post(data::request_data_access))
        .route(
            "/data/access/{blob_ref}/validate",
            get(data::validate_data_access),
        )
        .route("/records/{record_id}/seal", post(records::seal_record))
        .route("/records/{record_id}", delete(records::tombstone_record))
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v1", v1_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::request_challenge,
        auth::verify_signature,
        auth::refresh_session,
        auth::logout,
        users::get_current_user,
        data::request_data_access,
        data::validate_data_access,
        records::seal_record,
        records::tombstone_record,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Challenge,
            ChallengeRequest,
            VerifyRequest,
            RefreshRequest,
            LogoutRequest,
            AuthSession,
            SessionTokens,
            Role,
            DataAccessBody,
            DataAccessResponse,
            ValidateAccessResponse,
            SealRecordRequest,
            SymmetricCiphertext,
            SymmetricAlgorithm,
            EciesEnvelope,
            users::UserMeResponse,
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Wallet challenge sign-in and sessions"),
        (name = "Users", description = "Session identity"),
        (name = "Data", description = "Consumer access to encrypted records"),
        (name = "Records", description = "Producer sealing and tombstoning"),
        (name = "Health", description = "Liveness and readiness")
    )
)]
struct ApiDoc;
