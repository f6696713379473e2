// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time authentication challenges.
//!
//! Per address: `NONE → ISSUED → (CONSUMED | EXPIRED)`. Issuing replaces any
//! unconsumed challenge, so only the latest one can be signed. Consumption
//! is a compare-and-delete on the exact stored bytes, so concurrent
//! consumers of the same challenge cannot both win.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::storage::{get_json, to_json, KeyValueStore, StoreResult};

pub const CHALLENGE_PREFIX: &str = "Sign this message to authenticate: ";
const NONCE_BYTES: usize = 32;
const KEY_PREFIX: &str = "challenge:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Challenge {
    /// Lower-cased subject address.
    pub address: String,
    pub nonce: String,
    /// The exact text the wallet must sign.
    pub message: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

fn challenge_key(address: &str) -> String {
    format!("{KEY_PREFIX}{}", address.to_ascii_lowercase())
}

pub struct ChallengeStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a fresh challenge, replacing any prior one for the address.
    pub async fn issue(&self, address: &str) -> StoreResult<Challenge> {
        let address = address.to_ascii_lowercase();
        let mut nonce = [0u8; NONCE_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let nonce = alloy::hex::encode(nonce);

        let issued_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::minutes(5));
        let challenge = Challenge {
            message: format!("{CHALLENGE_PREFIX}{nonce}"),
            address: address.clone(),
            nonce,
            issued_at,
            expires_at: issued_at + ttl,
        };

        self.store
            .put(&challenge_key(&address), &to_json(&challenge)?, Some(self.ttl))
            .await?;
        debug!(%address, "Challenge issued");
        Ok(challenge)
    }

    /// Active challenge without consuming it. A stale entry found here is
    /// removed.
    pub async fn peek(&self, address: &str) -> StoreResult<Option<Challenge>> {
        let key = challenge_key(address);
        let Some((challenge, raw)) = get_json::<Challenge>(self.store.as_ref(), &key).await? else {
            return Ok(None);
        };
        if challenge.is_expired(Utc::now()) {
            self.store.compare_and_delete(&key, &raw).await?;
            return Ok(None);
        }
        Ok(Some(challenge))
    }

    /// Consume the active challenge if `presented` is its exact message.
    ///
    /// Returns `true` at most once per issued challenge. Mismatch, expiry,
    /// absence and a lost race all return `false`.
    pub async fn consume(&self, address: &str, presented: &str) -> StoreResult<bool> {
        let key = challenge_key(address);
        let Some((challenge, raw)) = get_json::<Challenge>(self.store.as_ref(), &key).await? else {
            return Ok(false);
        };
        if challenge.is_expired(Utc::now()) || challenge.message.as_bytes() != presented.as_bytes() {
            return Ok(false);
        }
        self.store.compare_and_delete(&key, &raw).await
    }

    /// Drop every expired challenge.
    pub async fn sweep(&self) -> StoreResult<usize> {
        self.store.purge_expired(KEY_PREFIX).await
    }
}
