// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expiry Sweeper
//!
//! Background task that periodically deletes expired challenges, revocation
//! entries and rate-limit counters. Lookups already ignore expired entries;
//! the sweep only bounds storage growth, so it runs independently of the
//! request path and a sweep racing a read is harmless.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::kv::KeyValueStore;

/// Namespaces holding expiring entries.
pub const SWEPT_PREFIXES: [&str; 3] = ["challenge:", "revoked:", "ratelimit:"];

pub struct ExpirySweeper {
    store: Arc<dyn KeyValueStore>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn KeyValueStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Expiry sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    return;
                }
            }

            self.sweep_once().await;
        }
    }

    /// One pass over every namespace. Returns the number of entries removed.
    pub async fn sweep_once(&self) -> usize {
        let mut total = 0;
        for prefix in SWEPT_PREFIXES {
            match self.store.purge_expired(prefix).await {
                Ok(0) => {}
                Ok(removed) => {
                    debug!(prefix, removed, "Expiry sweeper: purged entries");
                    total += removed;
                }
                Err(e) => {
                    warn!(prefix, error = %e, "Expiry sweeper: purge failed");
                }
            }
        }
        total
    }
}
