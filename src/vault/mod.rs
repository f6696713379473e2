// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Vault
//!
//! Data-encryption keys are held in an external secret store and only ever
//! leave it through [`KeyVaultAdapter`]. Raw key bytes are zeroized on drop.

pub mod key_vault;
pub mod secret_store;

pub use key_vault::{sanitize_identifier, DataKey, KeyVaultAdapter};
pub use secret_store::{
    FsSecretStore, MemorySecretStore, SecretStore, SecretStoreError, SecretStoreResult,
};
