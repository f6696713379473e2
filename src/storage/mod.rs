// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Shared State Storage
//!
//! Challenges, revocation entries and rate-limit counters are the only
//! mutable state the broker keeps. They live in a [`KeyValueStore`] with
//! per-entry expiry so that several broker instances can share one store.
//!
//! ## Key Layout
//!
//! ```text
//! challenge:{lowercase_address}       # active challenge (JSON)
//! revoked:{sha256(token)}             # revocation marker, TTL = token lifetime
//! ratelimit:{address|ip}:{identifier} # attempt counter (JSON)
//! ```
//!
//! ## Backends
//!
//! - [`MemoryStore`]: sharded in-process maps (tests, single instance)
//! - [`RedbStore`]: embedded ACID file (single instance, survives restarts)

pub mod kv;
pub mod memory;
pub mod redb_store;
pub mod sweeper;

pub use kv::{get_json, to_json, KeyValueStore, StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use sweeper::ExpirySweeper;
