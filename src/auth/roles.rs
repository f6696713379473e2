// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session roles and the ranked on-chain role checks that assign them.

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::chain::role_id;

/// Role carried in session claims.
///
/// Roles are resolved from on-chain credentials when a session is minted
/// and never taken from client input.
///
/// - `Consumer` - requests access to records (default)
/// - `Producer` - owns records and grants consent
/// - `Provider` - hosts encrypted records
/// - `Admin` - operator access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Consumer,
    Producer,
    Provider,
    Admin,
}

impl Role {
    /// Admin holds every role's privileges; other roles only their own.
    pub fn has_privilege(&self, required: Role) -> bool {
        *self == Role::Admin || *self == required
    }

    /// Parse role from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Role> {
        match s.to_ascii_lowercase().as_str() {
            "consumer" => Some(Role::Consumer),
            "producer" => Some(Role::Producer),
            "provider" => Some(Role::Provider),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Consumer => "consumer",
            Role::Producer => "producer",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered role checks: the first role whose on-chain predicate holds wins,
/// otherwise the default applies.
#[derive(Debug, Clone)]
pub struct RoleRanking {
    candidates: Vec<(Role, B256)>,
    default: Role,
}

impl RoleRanking {
    pub fn new(order: &[Role], default: Role) -> Self {
        Self {
            candidates: order.iter().map(|r| (*r, role_id(r.as_str()))).collect(),
            default,
        }
    }

    /// producer → consumer → provider, defaulting to consumer.
    pub fn standard() -> Self {
        Self::new(&[Role::Producer, Role::Consumer, Role::Provider], Role::Consumer)
    }

    pub fn candidates(&self) -> &[(Role, B256)] {
        &self.candidates
    }

    pub fn default_role(&self) -> Role {
        self.default
    }
}

impl Default for RoleRanking {
    fn default() -> Self {
        Self::standard()
    }
}
