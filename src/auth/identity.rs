// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Resolve an address to its DID and session role.
//!
//! Lookup failures degrade to "no DID, default role" and are logged; only a
//! registered-but-inactive DID stops a session from being issued.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tracing::{debug, warn};

use super::roles::{Role, RoleRanking};
use crate::chain::{parse_address, with_deadline, DidRecord, IdentityOracle};
use crate::error::{BrokerError, BrokerResult};

/// Parse an address and return it with its canonical lowercase form.
pub fn normalize_address(address: &str) -> BrokerResult<(Address, String)> {
    let parsed = parse_address(address)
        .map_err(|_| BrokerError::InvalidRequest(format!("invalid address '{address}'")))?;
    Ok((parsed, format!("{parsed:#x}")))
}

/// Role and DID attached to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub role: Role,
    pub did: Option<String>,
}

pub struct IdentityResolver {
    oracle: Arc<dyn IdentityOracle>,
    ranking: RoleRanking,
    timeout: Duration,
}

impl IdentityResolver {
    pub fn new(oracle: Arc<dyn IdentityOracle>, ranking: RoleRanking, timeout: Duration) -> Self {
        Self {
            oracle,
            ranking,
            timeout,
        }
    }

    /// Bounded DID lookup. Errors are returned so callers can choose how to
    /// degrade.
    pub async fn lookup_did(&self, address: Address) -> BrokerResult<Option<DidRecord>> {
        with_deadline("did registry", self.timeout, self.oracle.resolve_did(address)).await
    }

    /// Resolve from scratch.
    pub async fn resolve(&self, address: Address) -> BrokerResult<ResolvedIdentity> {
        let lookup = self.lookup_did(address).await;
        self.identity_for(address, lookup).await
    }

    /// Turn a DID lookup result into a session identity.
    ///
    /// `DeactivatedUser` is the only error returned.
    pub async fn identity_for(
        &self,
        address: Address,
        lookup: BrokerResult<Option<DidRecord>>,
    ) -> BrokerResult<ResolvedIdentity> {
        let record = match lookup {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(%address, "No DID registered, using default role");
                return Ok(self.fallback(None));
            }
            Err(e) => {
                warn!(%address, error = %e, "DID resolution failed, using default role");
                return Ok(self.fallback(None));
            }
        };

        if !record.active {
            warn!(%address, did = %record.did, "DID is deactivated");
            return Err(BrokerError::DeactivatedUser);
        }

        for (role, role_id) in self.ranking.candidates() {
            let held = with_deadline(
                "did registry",
                self.timeout,
                self.oracle.has_role(&record.did, *role_id),
            )
            .await;
            match held {
                Ok(true) => {
                    return Ok(ResolvedIdentity {
                        role: *role,
                        did: Some(record.did),
                    })
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(%address, did = %record.did, error = %e, "Role check failed, using default role");
                    return Ok(self.fallback(Some(record.did)));
                }
            }
        }

        Ok(self.fallback(Some(record.did)))
    }

    fn fallback(&self, did: Option<String>) -> ResolvedIdentity {
        ResolvedIdentity {
            role: self.ranking.default_role(),
            did,
        }
    }
}
