// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Stateless cryptographic primitives.
//!
//! - [`keys`]: key pairs, signatures and EIP-191 address recovery
//! - [`ecies`]: public-key encryption to secp256k1 keys
//! - [`symmetric`]: AEAD and encrypt-then-MAC under 256-bit keys
//! - [`digest`]: hashing, HMAC, password KDF and canonical JSON hashing

pub mod digest;
pub mod ecies;
pub mod error;
pub mod keys;
pub mod symmetric;

pub use digest::{
    derive_key_from_password, hash, hash_bytes, hash_json, hmac_sha256, hmac_verify, Encoding,
    HashAlgorithm, PasswordDerivedKey,
};
pub use ecies::{decrypt_with_private_key, encrypt_with_public_key, EciesEnvelope};
pub use error::{CryptoError, CryptoResult};
pub use keys::{
    derive_public_key, generate_key_pair, recover_personal_sign_address, sign, verify, Curve,
    KeyPair, PrivateKey, PublicKey,
};
pub use symmetric::{
    generate_symmetric_key, symmetric_decrypt, symmetric_encrypt, SymmetricAlgorithm,
    SymmetricCiphertext, SYMMETRIC_KEY_LEN,
};
