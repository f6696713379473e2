// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication attempt counters with lockout.
//!
//! Counters are updated with compare-and-swap so two failing requests for
//! the same identifier never lose an increment, while unrelated identifiers
//! never contend.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::storage::{get_json, to_json, KeyValueStore, StoreError, StoreResult};

const KEY_PREFIX: &str = "ratelimit:";
const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Address,
    Ip,
}

impl IdentifierKind {
    fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Address => "address",
            IdentifierKind::Ip => "ip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub is_blocked: bool,
    pub blocked_until: Option<DateTime<Utc>>,
    pub attempt_count: u32,
}

impl RateLimitStatus {
    fn clear() -> Self {
        Self {
            is_blocked: false,
            blocked_until: None,
            attempt_count: 0,
        }
    }

    /// Whole seconds until the block lifts, at least 1 while blocked.
    pub fn retry_after_secs(&self) -> u64 {
        self.blocked_until
            .map(|until| (until - Utc::now()).num_seconds().max(1) as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Counter {
    attempts: u32,
    blocked_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
    /// How long an unblocked counter survives without new attempts.
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout: Duration::from_secs(900),
            window: Duration::from_secs(900),
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    policy: RateLimitPolicy,
}

fn counter_key(identifier: &str, kind: IdentifierKind) -> String {
    format!(
        "{KEY_PREFIX}{}:{}",
        kind.as_str(),
        identifier.to_ascii_lowercase()
    )
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    /// Current status. A block that has lapsed resets the counter.
    pub async fn check(&self, identifier: &str, kind: IdentifierKind) -> StoreResult<RateLimitStatus> {
        let key = counter_key(identifier, kind);
        let Some((counter, raw)) = get_json::<Counter>(self.store.as_ref(), &key).await? else {
            return Ok(RateLimitStatus::clear());
        };

        match counter.blocked_until {
            Some(until) if Utc::now() < until => Ok(RateLimitStatus {
                is_blocked: true,
                blocked_until: Some(until),
                attempt_count: counter.attempts,
            }),
            Some(_) => {
                // A concurrent writer may have replaced the entry; either way it is no longer ours.
                self.store.compare_and_delete(&key, &raw).await?;
                Ok(RateLimitStatus::clear())
            }
            None => Ok(RateLimitStatus {
                is_blocked: false,
                blocked_until: None,
                attempt_count: counter.attempts,
            }),
        }
    }

    /// Count a failed attempt, blocking the identifier once the threshold
    /// is reached.
    pub async fn record_attempt(
        &self,
        identifier: &str,
        kind: IdentifierKind,
    ) -> StoreResult<RateLimitStatus> {
        let key = counter_key(identifier, kind);
        let ttl = Some(self.policy.lockout + self.policy.window);

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = get_json::<Counter>(self.store.as_ref(), &key).await?;
            let now = Utc::now();

            let (previous, expected) = match &current {
                Some((counter, raw)) => {
                    let lapsed = counter.blocked_until.is_some_and(|until| now >= until);
                    let attempts = if lapsed { 0 } else { counter.attempts };
                    (attempts, Some(raw.as_slice()))
                }
                None => (0, None),
            };

            if let Some((counter, _)) = &current {
                if counter.blocked_until.is_some_and(|until| now < until) {
                    return Ok(RateLimitStatus {
                        is_blocked: true,
                        blocked_until: counter.blocked_until,
                        attempt_count: counter.attempts,
                    });
                }
            }

            let attempts = previous.saturating_add(1);
            let blocked_until = (attempts >= self.policy.max_attempts).then(|| {
                now + chrono::Duration::from_std(self.policy.lockout)
                    .unwrap_or(chrono::Duration::minutes(15))
            });
            let next = Counter {
                attempts,
                blocked_until,
            };

            if self
                .store
                .compare_and_swap(&key, expected, &to_json(&next)?, ttl)
                .await?
            {
                if let Some(until) = blocked_until {
                    info!(identifier, kind = kind.as_str(), %until, "Identifier locked out");
                }
                return Ok(RateLimitStatus {
                    is_blocked: blocked_until.is_some(),
                    blocked_until,
                    attempt_count: attempts,
                });
            }
        }

        warn!(identifier, kind = kind.as_str(), "Rate-limit counter contention");
        Err(StoreError::Conflict(key))
    }

    /// Forget all attempts for the identifier.
    pub async fn reset(&self, identifier: &str, kind: IdentifierKind) -> StoreResult<()> {
        self.store.delete(&counter_key(identifier, kind)).await?;
        Ok(())
    }
}
