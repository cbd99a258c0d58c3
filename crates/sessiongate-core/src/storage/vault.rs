//! Encrypted credential file.
//!
//! The whole key-value map lives in one file:
//!
//! ```text
//! [salt (16 bytes)][nonce (12 bytes)][ChaCha20-Poly1305 ciphertext of the JSON map]
//! ```
//!
//! The cipher key is derived from a passphrase with Argon2 over the salt.
//! The salt stays fixed for the life of the file; every write draws a fresh
//! nonce.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use argon2::Argon2;
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use super::{SecureStorage, StorageError};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Derived key cached against the salt it was derived from
struct VaultKey {
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

pub struct VaultStorage {
    inner: Arc<VaultFile>,
}

/// State shared with the blocking pool. The key lock is held for the
/// whole read-modify-write, so operations on one vault never interleave.
struct VaultFile {
    path: PathBuf,
    passphrase: String,
    key: Mutex<Option<VaultKey>>,
}

impl VaultStorage {
    /// Open (or lazily create) a vault at `path`. No I/O happens until the
    /// first read or write.
    pub fn open(path: impl Into<PathBuf>, passphrase: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(VaultFile {
                path: path.into(),
                passphrase: passphrase.into(),
                key: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// File I/O and key derivation block, so each operation runs on the
    /// blocking pool.
    async fn with_vault<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&VaultFile, &mut Option<VaultKey>) -> Result<T, StorageError> + Send + 'static,
    {
        let vault = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut cached = vault
                .key
                .lock()
                .map_err(|_| StorageError::Task("Vault lock poisoned".to_string()))?;
            op(&*vault, &mut *cached)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

impl VaultFile {
    fn derive_key(&self, salt: &[u8; SALT_LEN]) -> Result<[u8; KEY_LEN], StorageError> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(self.passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| StorageError::Crypto(format!("Key derivation failed: {}", e)))?;
        Ok(key)
    }

    /// Key for `salt`, reusing the cached derivation when the salt matches
    fn key_for(
        &self,
        cached: &mut Option<VaultKey>,
        salt: [u8; SALT_LEN],
    ) -> Result<[u8; KEY_LEN], StorageError> {
        if let Some(vault_key) = cached.as_ref() {
            if vault_key.salt == salt {
                return Ok(vault_key.key);
            }
        }
        let key = self.derive_key(&salt)?;
        *cached = Some(VaultKey { salt, key });
        Ok(key)
    }

    fn read_map(
        &self,
        cached: &mut Option<VaultKey>,
    ) -> Result<HashMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let contents = std::fs::read(&self.path)?;
        if contents.len() < SALT_LEN + NONCE_LEN {
            return Err(StorageError::Crypto("Vault file too short".to_string()));
        }

        let (salt_bytes, rest) = contents.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(salt_bytes);

        let key = self.key_for(cached, salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                StorageError::Crypto("Vault decryption failed (wrong passphrase or corrupt file)".to_string())
            })?;

        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn write_map(
        &self,
        cached: &mut Option<VaultKey>,
        map: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let salt = match cached.as_ref() {
            Some(vault_key) => vault_key.salt,
            None => {
                let mut salt = [0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                salt
            }
        };
        let key = self.key_for(cached, salt)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let plaintext = serde_json::to_vec(map)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| StorageError::Crypto("Vault encryption failed".to_string()))?;

        let mut contents = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        contents.extend_from_slice(&salt);
        contents.extend_from_slice(&nonce_bytes);
        contents.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a half-written vault
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &contents)?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), entries = map.len(), "Vault written");
        Ok(())
    }
}

#[async_trait]
impl SecureStorage for VaultStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = key.to_string();
        self.with_vault(move |vault, cached| {
            let map = vault.read_map(cached)?;
            Ok(map.get(&key).cloned())
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_vault(move |vault, cached| {
            let mut map = vault.read_map(cached)?;
            map.insert(key, value);
            vault.write_map(cached, &map)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.with_vault(move |vault, cached| {
            let mut map = vault.read_map(cached)?;
            if map.remove(&key).is_some() {
                vault.write_map(cached, &map)?;
            }
            Ok(())
        })
        .await
    }
}
