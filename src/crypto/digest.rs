// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hashing, HMAC and password-based key derivation.

use std::io;

use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use utoipa::ToSchema;
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

/// Salt length generated by [`derive_key_from_password`] when none is given.
pub const PASSWORD_SALT_LEN: usize = 16;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
    Keccak256,
}

/// Text encoding for digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Hex,
    Base64,
}

impl Encoding {
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            Encoding::Hex => alloy::hex::encode(bytes),
            Encoding::Base64 => BASE64.encode(bytes),
        }
    }
}

/// Raw digest of `data`.
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        HashAlgorithm::Keccak256 => alloy::primitives::keccak256(data).to_vec(),
    }
}

/// Encoded digest of `data`.
pub fn hash(data: &[u8], algorithm: HashAlgorithm, encoding: Encoding) -> String {
    encoding.encode(&hash_bytes(data, algorithm))
}

/// HMAC-SHA256 tag over `data`.
pub fn hmac_sha256(data: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Check an HMAC-SHA256 tag in constant time.
pub fn hmac_verify(data: &[u8], key: &[u8], tag: &[u8]) -> CryptoResult<bool> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.verify_slice(tag).is_ok())
}

/// A key stretched from a password, with the salt needed to re-derive it.
pub struct PasswordDerivedKey {
    pub key: Zeroizing<[u8; 32]>,
    pub salt: Vec<u8>,
}

/// Stretch a password into a 256-bit key with Argon2id.
///
/// A random salt is generated when `salt` is `None`; callers persist the
/// returned salt to derive the same key later.
pub fn derive_key_from_password(
    password: &str,
    salt: Option<&[u8]>,
) -> CryptoResult<PasswordDerivedKey> {
    let salt = match salt {
        Some(salt) => salt.to_vec(),
        None => {
            let mut fresh = vec![0u8; PASSWORD_SALT_LEN];
            OsRng.fill_bytes(&mut fresh);
            fresh
        }
    };

    let mut key = Zeroizing::new([0u8; 32]);
    Argon2::default()
        .hash_password_into(password.as_bytes(), &salt, key.as_mut())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(PasswordDerivedKey { key, salt })
}

/// Serialize a JSON document with sorted keys, `", "` / `": "` separators
/// and `\uXXXX` escapes for non-ASCII text.
///
/// This matches the producer-side record hashing utility byte for byte, so
/// fingerprints computed here agree with the ones registered on-chain.
pub fn canonical_json(value: &serde_json::Value) -> CryptoResult<String> {
    let sorted = sort_keys(value);
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    serde::Serialize::serialize(&sorted, &mut serializer)
        .map_err(|e| CryptoError::Encoding(e.to_string()))?;
    String::from_utf8(out).map_err(|e| CryptoError::Encoding(e.to_string()))
}

/// Digest of a JSON document in its canonical form.
pub fn hash_json(
    value: &serde_json::Value,
    algorithm: HashAlgorithm,
    encoding: Encoding,
) -> CryptoResult<String> {
    Ok(hash(canonical_json(value)?.as_bytes(), algorithm, encoding))
}

fn sort_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_keys).collect())
        }
        other => other.clone(),
    }
}

struct SpacedAsciiFormatter;

impl serde_json::ser::Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        // Control characters arrive as escapes already; DEL does not.
        for ch in fragment.chars() {
            if ch.is_ascii() && ch != '\u{7f}' {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            hash(b"hello world", HashAlgorithm::Sha256, Encoding::Hex),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn keccak256_known_vector() {
        assert_eq!(
            hash(b"", HashAlgorithm::Keccak256, Encoding::Hex),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(hash_bytes(b"x", HashAlgorithm::Sha512).len(), 64);
        assert_eq!(hash_bytes(b"x", HashAlgorithm::Sha256).len(), 32);
    }

    #[test]
    fn hmac_verifies_and_rejects() {
        let tag = hmac_sha256(b"payload", b"key").unwrap();
        assert!(hmac_verify(b"payload", b"key", &tag).unwrap());
        assert!(!hmac_verify(b"payload!", b"key", &tag).unwrap());
        assert!(!hmac_verify(b"payload", b"other", &tag).unwrap());
        assert!(!hmac_verify(b"payload", b"key", &tag[..16]).unwrap());
    }

    #[test]
    fn password_derivation_is_reproducible_with_salt() {
        let first = derive_key_from_password("correct horse", None).unwrap();
        assert_eq!(first.salt.len(), PASSWORD_SALT_LEN);

        let again = derive_key_from_password("correct horse", Some(&first.salt)).unwrap();
        assert_eq!(*first.key, *again.key);

        let wrong = derive_key_from_password("battery staple", Some(&first.salt)).unwrap();
        assert_ne!(*first.key, *wrong.key);
    }

    #[test]
    fn canonical_json_sorts_keys_with_spaced_separators() {
        let doc = json!({ "name": "John", "age": 19, "tags": ["a", "b"] });
        assert_eq!(
            canonical_json(&doc).unwrap(),
            r#"{"age": 19, "name": "John", "tags": ["a", "b"]}"#
        );
    }

    #[test]
    fn canonical_json_escapes_non_ascii() {
        let doc = json!({ "city": "Zürich" });
        assert_eq!(canonical_json(&doc).unwrap(), r#"{"city": "Z\u00fcrich"}"#);
    }

    #[test]
    fn canonical_json_escapes_delete_and_control_characters() {
        let doc = json!({ "k": "a\u{7f}b\u{1}\n" });
        assert_eq!(canonical_json(&doc).unwrap(), r#"{"k": "a\u007fb\u0001\n"}"#);
    }

    #[test]
    fn hash_json_ignores_key_order() {
        let a = json!({ "b": 1, "a": { "y": 2, "x": 3 } });
        let b = json!({ "a": { "x": 3, "y": 2 }, "b": 1 });
        assert_eq!(
            hash_json(&a, HashAlgorithm::Sha256, Encoding::Hex).unwrap(),
            hash_json(&b, HashAlgorithm::Sha256, Encoding::Hex).unwrap()
        );
    }
}
