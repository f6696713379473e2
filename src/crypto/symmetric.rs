// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric encryption under a 256-bit key.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::Aes256Gcm;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::ChaCha20Poly1305;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::digest::{hmac_sha256, hmac_verify};
use super::error::{CryptoError, CryptoResult};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Required key length for every algorithm.
pub const SYMMETRIC_KEY_LEN: usize = 32;

const AEAD_NONCE_LEN: usize = 12;
const AEAD_TAG_LEN: usize = 16;
const CTR_IV_LEN: usize = 16;
const CTR_SUBKEY_INFO: &[u8] = b"did-access-broker/aes-256-ctr-hmac-sha256/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum SymmetricAlgorithm {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    /// AES-256-CTR with an HMAC-SHA256 tag over `iv || ciphertext`.
    #[serde(rename = "aes-256-ctr-hmac-sha256")]
    Aes256CtrHmacSha256,
}

/// Ciphertext plus everything needed to decrypt it given the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SymmetricCiphertext {
    pub algorithm: SymmetricAlgorithm,
    /// Base64 nonce or IV.
    pub nonce: String,
    /// Base64.
    pub ciphertext: String,
    /// Base64 authentication tag.
    pub tag: String,
}

impl SymmetricCiphertext {
    /// Serialized form used for stored blobs.
    pub fn to_json_bytes(&self) -> CryptoResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CryptoError::Encoding(e.to_string()))
    }

    pub fn from_json_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CryptoError::Encoding(e.to_string()))
    }
}

/// Encrypt with a fresh random nonce.
pub fn symmetric_encrypt(
    plaintext: &[u8],
    key: &[u8],
    algorithm: SymmetricAlgorithm,
) -> CryptoResult<SymmetricCiphertext> {
    ensure_key_len(key)?;

    let (nonce, ciphertext, tag) = match algorithm {
        SymmetricAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            let nonce = random_bytes(AEAD_NONCE_LEN);
            let (ct, tag) = split_tag(
                cipher
                    .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?,
            );
            (nonce, ct, tag)
        }
        SymmetricAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            let nonce = random_bytes(AEAD_NONCE_LEN);
            let (ct, tag) = split_tag(
                cipher
                    .encrypt(chacha20poly1305::Nonce::from_slice(&nonce), plaintext)
                    .map_err(|e| CryptoError::Encryption(e.to_string()))?,
            );
            (nonce, ct, tag)
        }
        SymmetricAlgorithm::Aes256CtrHmacSha256 => {
            let (enc_key, mac_key) = ctr_subkeys(key)?;
            let iv = random_bytes(CTR_IV_LEN);
            let mut ct = plaintext.to_vec();
            Aes256Ctr::new_from_slices(enc_key.as_slice(), &iv)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .apply_keystream(&mut ct);
            let tag = hmac_sha256(&[iv.as_slice(), ct.as_slice()].concat(), mac_key.as_slice())?;
            (iv, ct, tag)
        }
    };

    Ok(SymmetricCiphertext {
        algorithm,
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
        tag: BASE64.encode(tag),
    })
}

/// Decrypt and authenticate. Any tag mismatch is [`CryptoError::Decryption`].
pub fn symmetric_decrypt(
    encrypted: &SymmetricCiphertext,
    key: &[u8],
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    ensure_key_len(key)?;

    let nonce = decode_b64(&encrypted.nonce)?;
    let ciphertext = decode_b64(&encrypted.ciphertext)?;
    let tag = decode_b64(&encrypted.tag)?;

    let plaintext = match encrypted.algorithm {
        SymmetricAlgorithm::Aes256Gcm => {
            ensure_nonce_len(&nonce, AEAD_NONCE_LEN)?;
            let cipher = Aes256Gcm::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            cipher
                .decrypt(aes_gcm::Nonce::from_slice(&nonce), [ciphertext, tag].concat().as_slice())
                .map_err(|_| CryptoError::Decryption)?
        }
        SymmetricAlgorithm::ChaCha20Poly1305 => {
            ensure_nonce_len(&nonce, AEAD_NONCE_LEN)?;
            let cipher = ChaCha20Poly1305::new_from_slice(key)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            cipher
                .decrypt(chacha20poly1305::Nonce::from_slice(&nonce), [ciphertext, tag].concat().as_slice())
                .map_err(|_| CryptoError::Decryption)?
        }
        SymmetricAlgorithm::Aes256CtrHmacSha256 => {
            ensure_nonce_len(&nonce, CTR_IV_LEN)?;
            let (enc_key, mac_key) = ctr_subkeys(key)?;
            let authenticated = [nonce.as_slice(), ciphertext.as_slice()].concat();
            if !hmac_verify(&authenticated, mac_key.as_slice(), &tag)? {
                return Err(CryptoError::Decryption);
            }
            let mut pt = ciphertext;
            Aes256Ctr::new_from_slices(enc_key.as_slice(), &nonce)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .apply_keystream(&mut pt);
            pt
        }
    };

    Ok(Zeroizing::new(plaintext))
}

/// A fresh random 256-bit key.
pub fn generate_symmetric_key() -> Zeroizing<[u8; SYMMETRIC_KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_LEN]);
    OsRng.fill_bytes(key.as_mut());
    key
}

fn ctr_subkeys(key: &[u8]) -> CryptoResult<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>)> {
    let mut okm = Zeroizing::new([0u8; 64]);
    Hkdf::<Sha256>::new(None, key)
        .expand(CTR_SUBKEY_INFO, okm.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let mut enc = Zeroizing::new([0u8; 32]);
    let mut mac = Zeroizing::new([0u8; 32]);
    enc.copy_from_slice(&okm[..32]);
    mac.copy_from_slice(&okm[32..]);
    Ok((enc, mac))
}

fn split_tag(mut sealed: Vec<u8>) -> (Vec<u8>, Vec<u8>) {
    let tag = sealed.split_off(sealed.len() - AEAD_TAG_LEN);
    (sealed, tag)
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    OsRng.fill_bytes(&mut out);
    out
}

fn ensure_key_len(key: &[u8]) -> CryptoResult<()> {
    if key.len() != SYMMETRIC_KEY_LEN {
        return Err(CryptoError::InvalidKey(format!(
            "expected a {SYMMETRIC_KEY_LEN}-byte key, got {}",
            key.len()
        )));
    }
    Ok(())
}

fn ensure_nonce_len(nonce: &[u8], expected: usize) -> CryptoResult<()> {
    if nonce.len() != expected {
        return Err(CryptoError::Encoding(format!(
            "expected a {expected}-byte nonce, got {}",
            nonce.len()
        )));
    }
    Ok(())
}

fn decode_b64(value: &str) -> CryptoResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SymmetricAlgorithm; 3] = [
        SymmetricAlgorithm::Aes256Gcm,
        SymmetricAlgorithm::ChaCha20Poly1305,
        SymmetricAlgorithm::Aes256CtrHmacSha256,
    ];

    #[test]
    fn every_algorithm_decrypts_its_own_output() {
        let key = generate_symmetric_key();
        for algorithm in ALL {
            let sealed = symmetric_encrypt(b"patient record", key.as_slice(), algorithm).unwrap();
            assert_eq!(sealed.algorithm, algorithm);
            let opened = symmetric_decrypt(&sealed, key.as_slice()).unwrap();
            assert_eq!(opened.as_slice(), b"patient record");
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let key = generate_symmetric_key();
        let other = generate_symmetric_key();
        for algorithm in ALL {
            let sealed = symmetric_encrypt(b"data", key.as_slice(), algorithm).unwrap();
            assert!(matches!(
                symmetric_decrypt(&sealed, other.as_slice()),
                Err(CryptoError::Decryption)
            ));
        }
    }

    #[test]
    fn ctr_mode_detects_flipped_ciphertext() {
        let key = generate_symmetric_key();
        let mut sealed =
            symmetric_encrypt(b"data", key.as_slice(), SymmetricAlgorithm::Aes256CtrHmacSha256)
                .unwrap();
        let mut ct = BASE64.decode(&sealed.ciphertext).unwrap();
        ct[0] ^= 0x01;
        sealed.ciphertext = BASE64.encode(ct);
        assert!(matches!(
            symmetric_decrypt(&sealed, key.as_slice()),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn short_key_is_rejected() {
        assert!(matches!(
            symmetric_encrypt(b"data", &[0u8; 16], SymmetricAlgorithm::Aes256Gcm),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn serialized_form_names_the_algorithm() {
        let key = generate_symmetric_key();
        let sealed =
            symmetric_encrypt(b"data", key.as_slice(), SymmetricAlgorithm::ChaCha20Poly1305)
                .unwrap();
        let bytes = sealed.to_json_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["algorithm"], "chacha20-poly1305");
        assert_eq!(SymmetricCiphertext::from_json_bytes(&bytes).unwrap(), sealed);
    }
}
