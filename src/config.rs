// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the startup loader.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `JWT_ACCESS_SECRET` | HS256 secret for access tokens | Required |
//! | `JWT_REFRESH_SECRET` | HS256 secret for refresh tokens (must differ) | Required |
//! | `JWT_ISSUER` | `iss` claim | `did-access-broker` |
//! | `ACCESS_TOKEN_TTL_SECS` | Access token lifetime | `3600` |
//! | `REFRESH_TOKEN_TTL_SECS` | Refresh token lifetime | `604800` |
//! | `CHALLENGE_TTL_SECS` | Challenge lifetime | `300` |
//! | `SWEEP_INTERVAL_SECS` | Expired-entry sweep period | `60` |
//! | `RATE_LIMIT_MAX_ATTEMPTS` | Failures before lockout | `5` |
//! | `RATE_LIMIT_LOCKOUT_SECS` | Lockout duration | `900` |
//! | `RATE_LIMIT_WINDOW_SECS` | Idle counter lifetime | `900` |
//! | `UPSTREAM_TIMEOUT_MS` | Bound on oracle/vault/blob calls | `10000` |
//! | `CHAIN_RPC_URL` | EVM JSON-RPC endpoint | Required |
//! | `DID_REGISTRY_ADDRESS` | DID/role registry contract | Required |
//! | `CONSENT_REGISTRY_ADDRESS` | Consent registry contract | Required |
//! | `BLOB_GATEWAY_URL` | Blob gateway base URL | Required |
//! | `STORE_PATH` | redb file for challenges, revocations, counters | in-memory |
//! | `SECRETS_DIR` | Directory for the file-backed secret store | in-memory |
//! | `ENVELOPE_MODE` | `record_key` or `session_key` | `record_key` |
//! | `EPHEMERAL_KEY_TTL_SECS` | Session key lifetime in the vault | `300` |
//! | `REGISTRY_VERIFIER_FALLBACK` | Local recovery when the registry is unreachable | `true` |
//! | `TRUST_FORWARDED_FOR` | Take the client IP from `X-Forwarded-For` (only behind a proxy that sets it) | `false` |
//!
//! Durations must be positive. Second-valued settings are capped at
//! `MAX_DURATION_SECS` and the upstream timeout at `MAX_UPSTREAM_TIMEOUT_MS`.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::auth::{RateLimitPolicy, TokenSettings};
use crate::broker::EnvelopeMode;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const JWT_ACCESS_SECRET_ENV: &str = "JWT_ACCESS_SECRET";
pub const JWT_REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";
pub const JWT_ISSUER_ENV: &str = "JWT_ISSUER";
pub const ACCESS_TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_TTL_SECS";
pub const REFRESH_TOKEN_TTL_ENV: &str = "REFRESH_TOKEN_TTL_SECS";
pub const CHALLENGE_TTL_ENV: &str = "CHALLENGE_TTL_SECS";
pub const SWEEP_INTERVAL_ENV: &str = "SWEEP_INTERVAL_SECS";
pub const RATE_LIMIT_MAX_ATTEMPTS_ENV: &str = "RATE_LIMIT_MAX_ATTEMPTS";
pub const RATE_LIMIT_LOCKOUT_ENV: &str = "RATE_LIMIT_LOCKOUT_SECS";
pub const RATE_LIMIT_WINDOW_ENV: &str = "RATE_LIMIT_WINDOW_SECS";
pub const UPSTREAM_TIMEOUT_ENV: &str = "UPSTREAM_TIMEOUT_MS";
pub const CHAIN_RPC_URL_ENV: &str = "CHAIN_RPC_URL";
pub const DID_REGISTRY_ENV: &str = "DID_REGISTRY_ADDRESS";
pub const CONSENT_REGISTRY_ENV: &str = "CONSENT_REGISTRY_ADDRESS";
pub const BLOB_GATEWAY_URL_ENV: &str = "BLOB_GATEWAY_URL";
pub const STORE_PATH_ENV: &str = "STORE_PATH";
pub const SECRETS_DIR_ENV: &str = "SECRETS_DIR";
pub const ENVELOPE_MODE_ENV: &str = "ENVELOPE_MODE";
pub const EPHEMERAL_KEY_TTL_ENV: &str = "EPHEMERAL_KEY_TTL_SECS";
pub const REGISTRY_FALLBACK_ENV: &str = "REGISTRY_VERIFIER_FALLBACK";
pub const TRUST_FORWARDED_FOR_ENV: &str = "TRUST_FORWARDED_FOR";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ISSUER: &str = "did-access-broker";
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: u64 = 3600;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECS: u64 = 604_800;
pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 300;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RATE_LIMIT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RATE_LIMIT_LOCKOUT_SECS: u64 = 900;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 900;
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_EPHEMERAL_KEY_TTL_SECS: u64 = 300;

/// Ten years.
pub const MAX_DURATION_SECS: u64 = 315_360_000;
pub const MAX_UPSTREAM_TIMEOUT_MS: u64 = 600_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },

    #[error("{name} must be between 1 and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: u64,
        max: u64,
    },

    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub did_registry: String,
    pub consent_registry: String,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    pub tokens: TokenSettings,
    pub challenge_ttl: Duration,
    pub sweep_interval: Duration,
    pub rate_limit: RateLimitPolicy,
    pub upstream_timeout: Duration,
    pub chain: ChainConfig,
    pub blob_gateway_url: String,
    pub store_path: Option<PathBuf>,
    pub secrets_dir: Option<PathBuf>,
    pub envelope_mode: EnvelopeMode,
    pub ephemeral_key_ttl: Duration,
    pub registry_fallback: bool,
    pub trust_forwarded_for: bool,
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &'static str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));
        let parsed = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            var(name).map_or(Ok(default), |value| parse(name, &value))
        };
        let bounded = |name: &'static str, default: u64, max: u64| -> Result<u64, ConfigError> {
            let value = parsed(name, default)?;
            if value == 0 || value > max {
                return Err(ConfigError::OutOfRange { name, value, max });
            }
            Ok(value)
        };
        let seconds = |name: &'static str, default: u64| {
            bounded(name, default, MAX_DURATION_SECS).map(Duration::from_secs)
        };

        let host = var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = var(PORT_ENV).map_or(Ok(DEFAULT_PORT), |value| parse(PORT_ENV, &value))?;
        let bind_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::Invalid {
                name: HOST_ENV,
                value: host.clone(),
            })?;

        let log_format = match var(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    value: other.to_string(),
                })
            }
        };

        let access_secret = required(JWT_ACCESS_SECRET_ENV)?;
        let refresh_secret = required(JWT_REFRESH_SECRET_ENV)?;
        if access_secret == refresh_secret {
            return Err(ConfigError::Inconsistent(format!(
                "{JWT_ACCESS_SECRET_ENV} and {JWT_REFRESH_SECRET_ENV} must differ"
            )));
        }

        let access_ttl = seconds(ACCESS_TOKEN_TTL_ENV, DEFAULT_ACCESS_TOKEN_TTL_SECS)?;
        let refresh_ttl = seconds(REFRESH_TOKEN_TTL_ENV, DEFAULT_REFRESH_TOKEN_TTL_SECS)?;
        if access_ttl > refresh_ttl {
            return Err(ConfigError::Inconsistent(format!(
                "{ACCESS_TOKEN_TTL_ENV} must not exceed {REFRESH_TOKEN_TTL_ENV}"
            )));
        }

        let max_attempts = var(RATE_LIMIT_MAX_ATTEMPTS_ENV).map_or(
            Ok(DEFAULT_RATE_LIMIT_MAX_ATTEMPTS),
            |value| parse(RATE_LIMIT_MAX_ATTEMPTS_ENV, &value),
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::Inconsistent(format!(
                "{RATE_LIMIT_MAX_ATTEMPTS_ENV} must be at least 1"
            )));
        }

        let envelope_mode = match var(ENVELOPE_MODE_ENV) {
            None => EnvelopeMode::default(),
            Some(value) => EnvelopeMode::parse(&value).ok_or(ConfigError::Invalid {
                name: ENVELOPE_MODE_ENV,
                value,
            })?,
        };

        let registry_fallback = var(REGISTRY_FALLBACK_ENV)
            .map_or(Ok(true), |value| parse::<bool>(REGISTRY_FALLBACK_ENV, &value))?;
        let trust_forwarded_for = var(TRUST_FORWARDED_FOR_ENV)
            .map_or(Ok(false), |value| parse::<bool>(TRUST_FORWARDED_FOR_ENV, &value))?;

        Ok(Self {
            bind_addr,
            log_format,
            tokens: TokenSettings {
                access_secret: access_secret.into_bytes(),
                refresh_secret: refresh_secret.into_bytes(),
                access_ttl,
                refresh_ttl,
                issuer: var(JWT_ISSUER_ENV).unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            },
            challenge_ttl: seconds(CHALLENGE_TTL_ENV, DEFAULT_CHALLENGE_TTL_SECS)?,
            sweep_interval: seconds(SWEEP_INTERVAL_ENV, DEFAULT_SWEEP_INTERVAL_SECS)?,
            rate_limit: RateLimitPolicy {
                max_attempts,
                lockout: seconds(RATE_LIMIT_LOCKOUT_ENV, DEFAULT_RATE_LIMIT_LOCKOUT_SECS)?,
                window: seconds(RATE_LIMIT_WINDOW_ENV, DEFAULT_RATE_LIMIT_WINDOW_SECS)?,
            },
            upstream_timeout: Duration::from_millis(bounded(
                UPSTREAM_TIMEOUT_ENV,
                DEFAULT_UPSTREAM_TIMEOUT_MS,
                MAX_UPSTREAM_TIMEOUT_MS,
            )?),
            chain: ChainConfig {
                rpc_url: required(CHAIN_RPC_URL_ENV)?,
                did_registry: required(DID_REGISTRY_ENV)?,
                consent_registry: required(CONSENT_REGISTRY_ENV)?,
            },
            blob_gateway_url: required(BLOB_GATEWAY_URL_ENV)?,
            store_path: var(STORE_PATH_ENV).map(PathBuf::from),
            secrets_dir: var(SECRETS_DIR_ENV).map(PathBuf::from),
            envelope_mode,
            ephemeral_key_ttl: seconds(EPHEMERAL_KEY_TTL_ENV, DEFAULT_EPHEMERAL_KEY_TTL_SECS)?,
            registry_fallback,
            trust_forwarded_for,
        })
    }
}

fn parse<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (JWT_ACCESS_SECRET_ENV, "access"),
            (JWT_REFRESH_SECRET_ENV, "refresh"),
            (CHAIN_RPC_URL_ENV, "http://127.0.0.1:8545"),
            (DID_REGISTRY_ENV, "0x1111111111111111111111111111111111111111"),
            (CONSENT_REGISTRY_ENV, "0x2222222222222222222222222222222222222222"),
            (BLOB_GATEWAY_URL_ENV, "http://127.0.0.1:8081"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<BrokerConfig, ConfigError> {
        BrokerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply() {
        let config = load(&base()).unwrap();
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.tokens.access_ttl, Duration::from_secs(3600));
        assert_eq!(config.rate_limit.max_attempts, 5);
        assert_eq!(config.envelope_mode, EnvelopeMode::RecordKey);
        assert!(config.registry_fallback);
        assert!(config.store_path.is_none());
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    fn zero_durations_are_rejected() {
        for name in [
            CHALLENGE_TTL_ENV,
            SWEEP_INTERVAL_ENV,
            UPSTREAM_TIMEOUT_ENV,
            ACCESS_TOKEN_TTL_ENV,
            RATE_LIMIT_LOCKOUT_ENV,
            RATE_LIMIT_WINDOW_ENV,
            EPHEMERAL_KEY_TTL_ENV,
        ] {
            let mut vars = base();
            vars.insert(name, "0");
            assert!(
                matches!(load(&vars), Err(ConfigError::OutOfRange { name: n, value: 0, .. }) if n == name),
                "{name}=0 should be rejected"
            );
        }
    }

    #[test]
    fn oversized_durations_are_rejected() {
        let mut vars = base();
        vars.insert(REFRESH_TOKEN_TTL_ENV, "18446744073709551615");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::OutOfRange { name: REFRESH_TOKEN_TTL_ENV, .. })
        ));

        let mut vars = base();
        vars.insert(CHALLENGE_TTL_ENV, "315360001");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::OutOfRange { name: CHALLENGE_TTL_ENV, max: MAX_DURATION_SECS, .. })
        ));

        let mut vars = base();
        vars.insert(UPSTREAM_TIMEOUT_ENV, "600001");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::OutOfRange { name: UPSTREAM_TIMEOUT_ENV, .. })
        ));

        let mut vars = base();
        vars.insert(ACCESS_TOKEN_TTL_ENV, "315360000");
        vars.insert(REFRESH_TOKEN_TTL_ENV, "315360000");
        assert!(load(&vars).is_ok());
    }

    #[test]
    fn missing_secret_is_reported() {
        let mut vars = base();
        vars.remove(JWT_REFRESH_SECRET_ENV);
        assert!(matches!(load(&vars), Err(ConfigError::Missing(JWT_REFRESH_SECRET_ENV))));
    }

    #[test]
    fn secrets_must_differ() {
        let mut vars = base();
        vars.insert(JWT_REFRESH_SECRET_ENV, "access");
        assert!(matches!(load(&vars), Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn access_ttl_cannot_exceed_refresh_ttl() {
        let mut vars = base();
        vars.insert(ACCESS_TOKEN_TTL_ENV, "7200");
        vars.insert(REFRESH_TOKEN_TTL_ENV, "3600");
        assert!(matches!(load(&vars), Err(ConfigError::Inconsistent(_))));
    }

    #[test]
    fn rejects_bad_values() {
        let mut vars = base();
        vars.insert(ENVELOPE_MODE_ENV, "raw");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = base();
        vars.insert(RATE_LIMIT_MAX_ATTEMPTS_ENV, "0");
        assert!(matches!(load(&vars), Err(ConfigError::Inconsistent(_))));

        let mut vars = base();
        vars.insert(PORT_ENV, "http");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { name: PORT_ENV, .. })));
    }

    #[test]
    fn json_logging_and_session_mode() {
        let mut vars = base();
        vars.insert(LOG_FORMAT_ENV, "json");
        vars.insert(ENVELOPE_MODE_ENV, "session_key");
        vars.insert(REGISTRY_FALLBACK_ENV, "false");
        vars.insert(TRUST_FORWARDED_FOR_ENV, "true");
        let config = load(&vars).unwrap();
        assert!(config.trust_forwarded_for);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.envelope_mode, EnvelopeMode::SessionKey);
        assert!(!config.registry_fallback);
    }
}
