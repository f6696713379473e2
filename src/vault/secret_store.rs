// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Secret store backends for the key vault.
//!
//! ## Filesystem layout ([`FsSecretStore`])
//!
//! ```text
//! {SECRETS_DIR}/
//!   {name}.json   # { "value": base64, "created_at": .., "expires_at": .. }
//! ```
//!
//! The directory is expected to be mounted as an encrypted filesystem; this
//! module performs plain file I/O and no cryptography of its own.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Longest accepted secret name.
pub const MAX_SECRET_NAME_LEN: usize = 127;

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("secret not found: {0}")]
    NotFound(String),

    #[error("invalid secret name: {0}")]
    InvalidName(String),

    #[error("secret store unavailable: {0}")]
    Unavailable(String),
}

pub type SecretStoreResult<T> = Result<T, SecretStoreError>;

/// The operations the key vault needs from a managed secret store.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, name: &str) -> SecretStoreResult<Zeroizing<Vec<u8>>>;

    /// Create or overwrite.
    async fn set_secret(
        &self,
        name: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> SecretStoreResult<()>;

    /// Write only if no live secret with this name exists. Returns whether
    /// this call created it.
    async fn create_secret(
        &self,
        name: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> SecretStoreResult<bool>;

    /// Returns once the store confirms removal. Absent names are `NotFound`.
    async fn delete_secret(&self, name: &str) -> SecretStoreResult<()>;
}

/// Names are restricted to `[A-Za-z0-9-]`.
pub fn validate_secret_name(name: &str) -> SecretStoreResult<()> {
    if name.is_empty()
        || name.len() > MAX_SECRET_NAME_LEN
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(SecretStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn expiry(ttl: Option<Duration>) -> SecretStoreResult<Option<DateTime<Utc>>> {
    ttl.map(|ttl| {
        chrono::Duration::from_std(ttl)
            .map(|ttl| Utc::now() + ttl)
            .map_err(|e| SecretStoreError::Unavailable(format!("invalid ttl: {e}")))
    })
    .transpose()
}

fn is_live(expires_at: Option<DateTime<Utc>>) -> bool {
    expires_at.is_none_or(|at| at > Utc::now())
}

// =============================================================================
// In-memory backend
// =============================================================================

struct MemorySecret {
    value: Zeroizing<Vec<u8>>,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local secret store for tests and development.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, MemorySecret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SecretStoreResult<std::sync::MutexGuard<'_, HashMap<String, MemorySecret>>> {
        self.secrets
            .lock()
            .map_err(|_| SecretStoreError::Unavailable("lock poisoned".to_string()))
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> SecretStoreResult<Zeroizing<Vec<u8>>> {
        validate_secret_name(name)?;
        self.lock()?
            .get(name)
            .filter(|s| is_live(s.expires_at))
            .map(|s| s.value.clone())
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }

    async fn set_secret(
        &self,
        name: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> SecretStoreResult<()> {
        validate_secret_name(name)?;
        let expires_at = expiry(ttl)?;
        self.lock()?.insert(
            name.to_string(),
            MemorySecret {
                value: Zeroizing::new(value.to_vec()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn create_secret(
        &self,
        name: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> SecretStoreResult<bool> {
        validate_secret_name(name)?;
        let expires_at = expiry(ttl)?;
        let mut secrets = self.lock()?;
        if secrets.get(name).is_some_and(|s| is_live(s.expires_at)) {
            return Ok(false);
        }
        secrets.insert(
            name.to_string(),
            MemorySecret {
                value: Zeroizing::new(value.to_vec()),
                expires_at,
            },
        );
        Ok(true)
    }

    async fn delete_secret(&self, name: &str) -> SecretStoreResult<()> {
        validate_secret_name(name)?;
        self.lock()?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| SecretStoreError::NotFound(name.to_string()))
    }
}

// =============================================================================
// Filesystem backend
// =============================================================================

#[derive(Serialize, Deserialize)]
struct SecretFile {
    value: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

/// One JSON file per secret under a (typically encrypted) data directory.
///
/// Writes go to a uniquely named temp file first. `set_secret` renames it
/// over the target; `create_secret` hard-links it into place, which fails
/// if the target exists, so create-if-absent is atomic across processes.
/// Replacing an expired secret moves it aside first and puts it back if
/// the moved file turns out to be a concurrent creator's live secret.
#[derive(Debug, Clone)]
pub struct FsSecretStore {
    root: PathBuf,
    create_lock: Arc<Mutex<()>>,
}

impl FsSecretStore {
    /// Open the store, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> SecretStoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(unavailable)?;
        Ok(Self {
            root,
            create_lock: Arc::new(Mutex::new(())),
        })
    }

    fn secret_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
    }

    fn read_file(&self, name: &str) -> SecretStoreResult<Option<SecretFile>> {
        read_secret_file(&self.secret_path(name))
    }

    /// Move an expired secret out of the way. Returns `false` if what was
    /// moved is live, in which case it is restored.
    fn retire_expired(&self, name: &str) -> SecretStoreResult<bool> {
        let path = self.secret_path(name);
        let retired = self.temp_path(name);
        match fs::rename(&path, &retired) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(unavailable(e)),
        }

        let moved = read_secret_file(&retired);
        let live = matches!(&moved, Ok(Some(record)) if is_live(record.expires_at));
        if live {
            match fs::hard_link(&retired, &path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    let _ = fs::remove_file(&retired);
                    return Err(unavailable(e));
                }
            }
        }
        let _ = fs::remove_file(&retired);
        moved.map(|_| !live)
    }


    fn write_temp(&self, name: &str, value: &[u8], ttl: Option<Duration>) -> SecretStoreResult<PathBuf> {
        let record = SecretFile {
            value: BASE64.encode(value),
            created_at: Utc::now(),
            expires_at: expiry(ttl)?,
        };
        let temp = self.temp_path(name);
        {
            let file = File::create(&temp).map_err(unavailable)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &record)
                .map_err(|e| SecretStoreError::Unavailable(e.to_string()))?;
            writer.flush().map_err(unavailable)?;
            writer.get_ref().sync_all().map_err(unavailable)?;
        }
        Ok(temp)
    }
}

fn read_secret_file(path: &Path) -> SecretStoreResult<Option<SecretFile>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SecretStoreError::Unavailable(format!("corrupt secret file: {e}"))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(unavailable(e)),
    }
}

fn unavailable(e: io::Error) -> SecretStoreError {
    SecretStoreError::Unavailable(e.to_string())
}

#[async_trait]
impl SecretStore for FsSecretStore {
    async fn get_secret(&self, name: &str) -> SecretStoreResult<Zeroizing<Vec<u8>>> {
        validate_secret_name(name)?;
        match self.read_file(name)? {
            Some(record) if is_live(record.expires_at) => BASE64
                .decode(&record.value)
                .map(Zeroizing::new)
                .map_err(|e| SecretStoreError::Unavailable(format!("corrupt secret value: {e}"))),
            _ => Err(SecretStoreError::NotFound(name.to_string())),
        }
    }

    async fn set_secret(
        &self,
        name: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> SecretStoreResult<()> {
        validate_secret_name(name)?;
        let temp = self.write_temp(name, value, ttl)?;
        if let Err(e) = fs::rename(&temp, self.secret_path(name)) {
            let _ = fs::remove_file(&temp);
            return Err(unavailable(e));
        }
        Ok(())
    }

    async fn create_secret(
        &self,
        name: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> SecretStoreResult<bool> {
        validate_secret_name(name)?;
        let path = self.secret_path(name);
        let _guard = self
            .create_lock
            .lock()
            .map_err(|_| SecretStoreError::Unavailable("secret store lock poisoned".into()))?;

        // An expired secret counts as absent
        if let Some(existing) = self.read_file(name)? {
            if is_live(existing.expires_at) || !self.retire_expired(name)? {
                return Ok(false);
            }
        }

        let temp = self.write_temp(name, value, ttl)?;
        let linked = fs::hard_link(&temp, &path);
        let _ = fs::remove_file(&temp);
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn delete_secret(&self, name: &str) -> SecretStoreResult<()> {
        validate_secret_name(name)?;
        match fs::remove_file(self.secret_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SecretStoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(unavailable(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn backends() -> (Vec<Box<dyn SecretStore>>, TempDir) {
        let dir = TempDir::new().unwrap();
        let fs_store = FsSecretStore::open(dir.path().join("secrets")).unwrap();
        (
            vec![Box::new(MemorySecretStore::new()), Box::new(fs_store)],
            dir,
        )
    }

    #[test]
    fn names_are_restricted() {
        assert!(validate_secret_name("dek-record42").is_ok());
        assert!(validate_secret_name("").is_err());
        assert!(validate_secret_name("../etc/passwd").is_err());
        assert!(validate_secret_name("a b").is_err());
        assert!(validate_secret_name(&"a".repeat(MAX_SECRET_NAME_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn set_get_delete() {
        let (stores, _dir) = backends();
        for store in stores {
            assert!(matches!(
                store.get_secret("dek-a").await,
                Err(SecretStoreError::NotFound(_))
            ));
            store.set_secret("dek-a", b"value-1", None).await.unwrap();
            store.set_secret("dek-a", b"value-2", None).await.unwrap();
            assert_eq!(store.get_secret("dek-a").await.unwrap().as_slice(), b"value-2");

            store.delete_secret("dek-a").await.unwrap();
            assert!(matches!(
                store.delete_secret("dek-a").await,
                Err(SecretStoreError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn create_only_if_absent() {
        let (stores, _dir) = backends();
        for store in stores {
            assert!(store.create_secret("dek-b", b"first", None).await.unwrap());
            assert!(!store.create_secret("dek-b", b"second", None).await.unwrap());
            assert_eq!(store.get_secret("dek-b").await.unwrap().as_slice(), b"first");
        }
    }

    #[tokio::test]
    async fn expired_secrets_read_as_absent() {
        let (stores, _dir) = backends();
        for store in stores {
            store
                .set_secret("eph-x", b"short", Some(Duration::from_millis(10)))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert!(matches!(
                store.get_secret("eph-x").await,
                Err(SecretStoreError::NotFound(_))
            ));
            assert!(store.create_secret("eph-x", b"fresh", None).await.unwrap());
        }
    }

    #[tokio::test]
    async fn fs_store_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = FsSecretStore::open(dir.path()).unwrap();
        store.set_secret("dek-c", b"v", None).await.unwrap();
        store.create_secret("dek-d", b"v", None).await.unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| n.ends_with(".json")));
    }

    #[tokio::test]
    async fn replacing_an_expired_secret_has_one_winner() {
        let dir = TempDir::new().unwrap();
        let store = FsSecretStore::open(dir.path()).unwrap();
        store
            .set_secret("dek-e", b"old", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_secret("dek-e", &[i], None).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.get_secret("dek-e").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retiring_a_secret_that_became_live_restores_it() {
        let dir = TempDir::new().unwrap();
        let store = FsSecretStore::open(dir.path()).unwrap();
        // Another process replaced the expired secret before this one moved it.
        store.set_secret("dek-f", b"theirs", None).await.unwrap();

        assert!(!store.retire_expired("dek-f").unwrap());
        assert_eq!(store.get_secret("dek-f").await.unwrap().as_slice(), b"theirs");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
