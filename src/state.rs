// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthenticationService, TokenService};
use crate::broker::DataAccessBroker;
use crate::chain::EvmRegistry;
use crate::storage::KeyValueStore;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthenticationService>,
    pub tokens: Arc<TokenService>,
    pub broker: Arc<DataAccessBroker>,
    /// Backing store for challenges, revocations and counters.
    pub store: Arc<dyn KeyValueStore>,
    /// Chain client queried by readiness checks; absent in tests.
    pub chain: Option<Arc<EvmRegistry>>,
    pub readiness_timeout: Duration,
    /// Take the client IP from `X-Forwarded-For` instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(
        auth: Arc<AuthenticationService>,
        tokens: Arc<TokenService>,
        broker: Arc<DataAccessBroker>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            auth,
            tokens,
            broker,
            store,
            chain: None,
            readiness_timeout: Duration::from_secs(2),
            trust_forwarded_for: false,
        }
    }

    pub fn with_chain(mut self, chain: Arc<EvmRegistry>, readiness_timeout: Duration) -> Self {
        self.chain = Some(chain);
        self.readiness_timeout = readiness_timeout;
        self
    }

    /// Only enable behind a proxy that overwrites the header.
    pub fn with_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }
}
