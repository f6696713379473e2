// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public-key encryption to secp256k1 keys.
//!
//! An ephemeral key agrees a shared secret with the recipient, HKDF-SHA256
//! stretches it (salted with the ephemeral public key) into an AES-256-GCM
//! key, and the envelope carries everything needed to reverse the process
//! with the recipient's private key alone.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hkdf::Hkdf;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};
use super::keys::{Curve, PrivateKey, PublicKey};

/// Identifier written into every envelope.
pub const ECIES_SCHEME: &str = "secp256k1-ecdh-hkdf-sha256-aes-256-gcm";

const HKDF_INFO: &[u8] = b"did-access-broker/ecies/v1";
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Self-describing public-key ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EciesEnvelope {
    pub scheme: String,
    /// Compressed SEC1 ephemeral key, hex.
    pub ephemeral_public_key: String,
    /// Base64.
    pub nonce: String,
    /// Base64.
    pub ciphertext: String,
    /// Base64 GCM tag.
    pub tag: String,
}

/// Encrypt `plaintext` so only the holder of `public_key` can read it.
///
/// Ed25519 keys are rejected with [`CryptoError::UnsupportedOperation`].
pub fn encrypt_with_public_key(
    plaintext: &[u8],
    public_key: &PublicKey,
) -> CryptoResult<EciesEnvelope> {
    ensure_encryption_curve(public_key.curve())?;

    let recipient = k256::PublicKey::from_sec1_bytes(public_key.as_bytes())
        .map_err(|_| CryptoError::InvalidKey("invalid SEC1 point".to_string()))?;

    let ephemeral = k256::ecdh::EphemeralSecret::random(&mut OsRng);
    let ephemeral_public = ephemeral.public_key().to_encoded_point(true);
    let shared = ephemeral.diffie_hellman(&recipient);

    let key = derive_envelope_key(shared.raw_secret_bytes().as_slice(), ephemeral_public.as_bytes())?;

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(EciesEnvelope {
        scheme: ECIES_SCHEME.to_string(),
        ephemeral_public_key: alloy::hex::encode(ephemeral_public.as_bytes()),
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(&sealed),
        tag: BASE64.encode(&tag),
    })
}

/// Open an envelope produced by [`encrypt_with_public_key`].
pub fn decrypt_with_private_key(
    envelope: &EciesEnvelope,
    private_key: &PrivateKey,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    ensure_encryption_curve(private_key.curve())?;
    if envelope.scheme != ECIES_SCHEME {
        return Err(CryptoError::UnsupportedOperation(format!(
            "unknown envelope scheme '{}'",
            envelope.scheme
        )));
    }

    let secret = k256::SecretKey::from_slice(private_key.as_bytes())
        .map_err(|_| CryptoError::InvalidKey("scalar out of range".to_string()))?;
    let ephemeral_bytes = alloy::hex::decode(&envelope.ephemeral_public_key)
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let ephemeral = k256::PublicKey::from_sec1_bytes(&ephemeral_bytes)
        .map_err(|_| CryptoError::InvalidKey("invalid ephemeral key".to_string()))?;

    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
    let key = derive_envelope_key(shared.raw_secret_bytes().as_slice(), &ephemeral_bytes)?;

    let nonce = decode_b64(&envelope.nonce)?;
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::Encoding(format!(
            "expected a {NONCE_LEN}-byte nonce, got {}",
            nonce.len()
        )));
    }
    let mut sealed = decode_b64(&envelope.ciphertext)?;
    sealed.extend_from_slice(&decode_b64(&envelope.tag)?);

    let cipher =
        Aes256Gcm::new_from_slice(key.as_slice()).map_err(|_| CryptoError::Decryption)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), sealed.as_slice())
        .map_err(|_| CryptoError::Decryption)?;
    Ok(Zeroizing::new(plaintext))
}

fn ensure_encryption_curve(curve: Curve) -> CryptoResult<()> {
    if curve.supports_encryption() {
        Ok(())
    } else {
        Err(CryptoError::UnsupportedOperation(format!(
            "{curve} keys cannot be used for encryption"
        )))
    }
}

fn derive_envelope_key(shared: &[u8], salt: &[u8]) -> CryptoResult<Zeroizing<[u8; 32]>> {
    let mut key = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(Some(salt), shared)
        .expand(HKDF_INFO, key.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

fn decode_b64(value: &str) -> CryptoResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}
