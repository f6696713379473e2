// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # On-Chain Oracles
//!
//! The DID/role registry and the consent registry are consulted read-only.
//! Calls into them (and into every other upstream) go through
//! [`with_deadline`], so a slow network surfaces as `UpstreamTimeout` rather
//! than as a definite answer.

pub mod oracle;
pub mod registry;

use std::fmt;
use std::future::Future;
use std::time::Duration;

pub use oracle::{role_id, AuthorizationOracle, DidRecord, IdentityOracle, OracleError};
pub use registry::{parse_address, EvmRegistry};

use crate::error::{BrokerError, BrokerResult};

/// Await an upstream call with a bound.
///
/// Elapsed → `UpstreamTimeout`; an upstream error → `UpstreamUnavailable`.
pub async fn with_deadline<T, E, F>(what: &'static str, timeout: Duration, fut: F) -> BrokerResult<T>
where
    E: fmt::Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(BrokerError::UpstreamUnavailable(format!("{what}: {e}"))),
        Err(_) => Err(BrokerError::UpstreamTimeout(what.to_string())),
    }
}
