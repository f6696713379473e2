// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use did_access_broker::{
    api::router,
    auth::{
        AuthenticationService, ChallengeStore, IdentityResolver, RateLimiter, RoleRanking,
        SignatureVerifier, TokenService,
    },
    blob::GatewayBlobStore,
    broker::DataAccessBroker,
    chain::EvmRegistry,
    config::BrokerConfig,
    state::AppState,
    storage::{ExpirySweeper, KeyValueStore, MemoryStore, RedbStore},
    telemetry::init_tracing,
    vault::{FsSecretStore, KeyVaultAdapter, MemorySecretStore, SecretStore},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = BrokerConfig::from_env()?;
    init_tracing(config.log_format);

    let store: Arc<dyn KeyValueStore> = match &config.store_path {
        Some(path) => {
            info!(path = %path.display(), "Opening state store");
            Arc::new(RedbStore::open(path)?)
        }
        None => {
            warn!("STORE_PATH not set; challenges and revocations are in-memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let secrets: Arc<dyn SecretStore> = match &config.secrets_dir {
        Some(dir) => Arc::new(FsSecretStore::open(dir.clone())?),
        None => {
            warn!("SECRETS_DIR not set; data keys are lost on restart");
            Arc::new(MemorySecretStore::new())
        }
    };

    let registry = Arc::new(EvmRegistry::new(
        &config.chain.rpc_url,
        &config.chain.did_registry,
        &config.chain.consent_registry,
    )?);
    let blobs = Arc::new(GatewayBlobStore::new(
        &config.blob_gateway_url,
        config.upstream_timeout,
    )?);

    let tokens = Arc::new(TokenService::new(config.tokens.clone(), Arc::clone(&store)));
    let auth = Arc::new(AuthenticationService::new(
        ChallengeStore::new(Arc::clone(&store), config.challenge_ttl),
        RateLimiter::new(Arc::clone(&store), config.rate_limit),
        SignatureVerifier::new(
            registry.clone(),
            config.upstream_timeout,
            config.registry_fallback,
        ),
        IdentityResolver::new(
            registry.clone(),
            RoleRanking::standard(),
            config.upstream_timeout,
        ),
        Arc::clone(&tokens),
    ));
    let vault = Arc::new(KeyVaultAdapter::new(secrets, config.upstream_timeout));
    let broker = Arc::new(
        DataAccessBroker::new(registry.clone(), blobs, vault, config.upstream_timeout)
            .with_mode(config.envelope_mode, config.ephemeral_key_ttl),
    );

    let state = AppState::new(auth, tokens, broker, Arc::clone(&store))
        .with_chain(registry, config.upstream_timeout)
        .with_forwarded_for(config.trust_forwarded_for);
    let app = router(state);

    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(store, config.sweep_interval);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %config.bind_addr,
        mode = ?config.envelope_mode,
        "DID access broker listening (docs at /docs)"
    );

    let signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
        signal.cancel();
    })
    .await?;

    shutdown.cancel();
    let _ = sweeper_handle.await;
    info!("DID access broker stopped");
    Ok(())
}
