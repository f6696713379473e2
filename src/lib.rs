// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! DID Access Broker - wallet sign-in and encrypted record access
//!
//! Wallet holders authenticate by signing a one-time challenge and receive
//! short-lived session tokens. Authorized consumers then receive provider
//! records re-encrypted for a public key they present, with the symmetric
//! key wrapped so only that key's holder can open it.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Challenges, signature checks, roles, rate limits and tokens
//! - `broker` - Consumer access and envelope re-encryption
//! - `chain` - DID and consent registry clients
//! - `blob` - Content-addressed record storage
//! - `crypto` - Keys, ECIES, AEAD and hashing primitives
//! - `storage` - Expiring key-value state (challenges, revocations, counters)
//! - `vault` - Data-encryption key custody

pub mod api;
pub mod auth;
pub mod blob;
pub mod broker;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod vault;

#[cfg(test)]
mod testutil;
