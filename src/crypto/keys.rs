// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key pairs, signing and verification over secp256k1 and Ed25519.
//!
//! Private keys are 32 raw bytes for both curves and are zeroized on drop.
//! Public keys are SEC1 (33 or 65 bytes) for secp256k1 and 32 raw bytes
//! for Ed25519.

use std::fmt;

use ed25519_dalek::{Signer as _, Verifier as _};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};

/// Length of a raw private key for either curve.
pub const SECRET_KEY_LEN: usize = 32;

/// Length of the message digest accepted by [`sign`] for secp256k1.
pub const DIGEST_LEN: usize = 32;

const ED25519_SIGNATURE_LEN: usize = 64;
const RECOVERABLE_SIGNATURE_LEN: usize = 65;

/// Supported curve families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    /// Ethereum curve: sign, verify, encrypt, decrypt.
    Secp256k1,
    /// Sign and verify only.
    Ed25519,
}

impl Curve {
    /// Whether public-key encryption is available on this curve.
    pub fn supports_encryption(&self) -> bool {
        matches!(self, Curve::Secp256k1)
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::Secp256k1 => write!(f, "secp256k1"),
            Curve::Ed25519 => write!(f, "ed25519"),
        }
    }
}

/// A private key. Never printed, zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey {
    curve: Curve,
    bytes: Zeroizing<[u8; SECRET_KEY_LEN]>,
}

impl PrivateKey {
    /// Build from 32 raw bytes, validating the scalar for secp256k1.
    pub fn from_bytes(curve: Curve, bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SECRET_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {SECRET_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        if curve == Curve::Secp256k1 {
            k256::SecretKey::from_slice(bytes)
                .map_err(|_| CryptoError::InvalidKey("scalar out of range".to_string()))?;
        }
        let mut raw = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        raw.copy_from_slice(bytes);
        Ok(Self { curve, bytes: raw })
    }

    /// Parse a hex-encoded key (with or without `0x`).
    pub fn from_hex(curve: Curve, hex_key: &str) -> CryptoResult<Self> {
        let raw = Zeroizing::new(
            alloy::hex::decode(hex_key.trim().trim_start_matches("0x"))
                .map_err(|e| CryptoError::Encoding(e.to_string()))?,
        );
        Self::from_bytes(curve, &raw)
    }

    /// Parse a secp256k1 key stored as PEM (SEC1 or PKCS#8).
    pub fn from_pem(pem_bytes: &[u8]) -> CryptoResult<Self> {
        use k256::pkcs8::DecodePrivateKey;

        let pem_str = std::str::from_utf8(pem_bytes)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid UTF-8: {e}")))?;
        let pem = pem::parse(pem_str)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid PEM: {e}")))?;

        let secret = match k256::SecretKey::from_sec1_der(pem.contents()) {
            Ok(secret) => secret,
            Err(_) => k256::SecretKey::from_pkcs8_der(pem.contents())
                .map_err(|e| CryptoError::InvalidKey(format!("invalid key format: {e}")))?,
        };

        Self::from_bytes(Curve::Secp256k1, secret.to_bytes().as_slice())
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LEN] {
        &self.bytes
    }

    /// Hex form, for handing to a wallet or persisting in a secret store.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(alloy::hex::encode(self.bytes.as_slice()))
    }

    fn secp256k1_signing_key(&self) -> CryptoResult<k256::ecdsa::SigningKey> {
        k256::ecdsa::SigningKey::from_slice(self.bytes.as_slice())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    fn ed25519_signing_key(&self) -> ed25519_dalek::SigningKey {
        ed25519_dalek::SigningKey::from_bytes(&self.bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("curve", &self.curve)
            .finish_non_exhaustive()
    }
}

/// A public key tagged with its curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    curve: Curve,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Build from raw bytes, validating the point encoding.
    pub fn from_bytes(curve: Curve, bytes: &[u8]) -> CryptoResult<Self> {
        match curve {
            Curve::Secp256k1 => {
                k256::PublicKey::from_sec1_bytes(bytes)
                    .map_err(|_| CryptoError::InvalidKey("invalid SEC1 point".to_string()))?;
            }
            Curve::Ed25519 => {
                let raw: [u8; 32] = bytes.try_into().map_err(|_| {
                    CryptoError::InvalidKey(format!("expected 32 bytes, got {}", bytes.len()))
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&raw)
                    .map_err(|_| CryptoError::InvalidKey("invalid Ed25519 point".to_string()))?;
            }
        }
        Ok(Self {
            curve,
            bytes: bytes.to_vec(),
        })
    }

    pub fn from_hex(curve: Curve, hex_key: &str) -> CryptoResult<Self> {
        let raw = alloy::hex::decode(hex_key.trim().trim_start_matches("0x"))
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        Self::from_bytes(curve, &raw)
    }

    /// Parse a hex key and infer the curve from its length
    /// (32 bytes → Ed25519, 33/65 bytes → secp256k1).
    pub fn parse(hex_key: &str) -> CryptoResult<Self> {
        let raw = alloy::hex::decode(hex_key.trim().trim_start_matches("0x"))
            .map_err(|e| CryptoError::Encoding(e.to_string()))?;
        let curve = match raw.len() {
            32 => Curve::Ed25519,
            33 | 65 => Curve::Secp256k1,
            n => {
                return Err(CryptoError::InvalidKey(format!(
                    "cannot infer curve from a {n}-byte key"
                )))
            }
        };
        Self::from_bytes(curve, &raw)
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        alloy::hex::encode(&self.bytes)
    }
}

/// A freshly generated or imported key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    pub fn curve(&self) -> Curve {
        self.private_key.curve()
    }
}

/// Generate a random key pair on the given curve.
pub fn generate_key_pair(curve: Curve) -> KeyPair {
    let mut raw = Zeroizing::new([0u8; SECRET_KEY_LEN]);
    let public = match curve {
        Curve::Secp256k1 => {
            let secret = k256::SecretKey::random(&mut OsRng);
            raw.copy_from_slice(secret.to_bytes().as_slice());
            secret.public_key().to_encoded_point(true).as_bytes().to_vec()
        }
        Curve::Ed25519 => {
            let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
            raw.copy_from_slice(&signing.to_bytes());
            signing.verifying_key().to_bytes().to_vec()
        }
    };
    KeyPair {
        private_key: PrivateKey { curve, bytes: raw },
        public_key: PublicKey {
            curve,
            bytes: public,
        },
    }
}

/// Derive the public key for a private key.
///
/// secp256k1 keys are returned in compressed SEC1 form.
pub fn derive_public_key(private_key: &PrivateKey) -> CryptoResult<PublicKey> {
    let bytes = match private_key.curve {
        Curve::Secp256k1 => k256::SecretKey::from_slice(private_key.bytes.as_slice())
            .map_err(|_| CryptoError::InvalidKey("scalar out of range".to_string()))?
            .public_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec(),
        Curve::Ed25519 => private_key
            .ed25519_signing_key()
            .verifying_key()
            .to_bytes()
            .to_vec(),
    };
    Ok(PublicKey {
        curve: private_key.curve,
        bytes,
    })
}

/// Sign a message digest.
///
/// secp256k1 expects a 32-byte digest and returns a 65-byte recoverable
/// signature `r || s || v` with `v = 27 + recovery_id`. Ed25519 signs the
/// digest bytes as-is and returns 64 bytes.
pub fn sign(digest: &[u8], private_key: &PrivateKey) -> CryptoResult<Vec<u8>> {
    match private_key.curve {
        Curve::Secp256k1 => {
            ensure_digest_len(digest)?;
            let signing_key = private_key.secp256k1_signing_key()?;
            let (signature, recovery_id) = signing_key
                .sign_prehash_recoverable(digest)
                .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
            let mut out = signature.to_bytes().to_vec();
            out.push(27 + recovery_id.to_byte());
            Ok(out)
        }
        Curve::Ed25519 => Ok(private_key
            .ed25519_signing_key()
            .sign(digest)
            .to_bytes()
            .to_vec()),
    }
}

/// Verify a signature over a message digest.
///
/// Returns `Ok(false)` for a well-formed signature that does not verify and
/// an error only for malformed input.
pub fn verify(digest: &[u8], signature: &[u8], public_key: &PublicKey) -> CryptoResult<bool> {
    match public_key.curve {
        Curve::Secp256k1 => {
            ensure_digest_len(digest)?;
            if signature.len() != RECOVERABLE_SIGNATURE_LEN && signature.len() != 64 {
                return Err(CryptoError::InvalidSignature(format!(
                    "expected 64 or 65 bytes, got {}",
                    signature.len()
                )));
            }
            let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&public_key.bytes)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            let signature = k256::ecdsa::Signature::from_slice(&signature[..64])
                .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
            Ok(verifying_key.verify_prehash(digest, &signature).is_ok())
        }
        Curve::Ed25519 => {
            if signature.len() != ED25519_SIGNATURE_LEN {
                return Err(CryptoError::InvalidSignature(format!(
                    "expected {ED25519_SIGNATURE_LEN} bytes, got {}",
                    signature.len()
                )));
            }
            let raw: [u8; 32] = public_key
                .bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("expected 32 bytes".to_string()))?;
            let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&raw)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            let signature = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
            Ok(verifying_key.verify(digest, &signature).is_ok())
        }
    }
}

/// Recover the address that produced an EIP-191 `personal_sign` signature
/// over `message`.
pub fn recover_personal_sign_address(
    message: &[u8],
    signature: &[u8],
) -> CryptoResult<alloy::primitives::Address> {
    let signature = alloy::primitives::Signature::from_raw(signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    signature
        .recover_address_from_msg(message)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
}

fn ensure_digest_len(digest: &[u8]) -> CryptoResult<()> {
    if digest.len() != DIGEST_LEN {
        return Err(CryptoError::Encoding(format!(
            "secp256k1 signs a {DIGEST_LEN}-byte digest, got {} bytes",
            digest.len()
        )));
    }
    Ok(())
}
