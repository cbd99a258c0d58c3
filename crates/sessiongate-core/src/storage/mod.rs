//! Secured key-value storage for credentials.
//!
//! This module provides:
//! - `SecureStorage`: the async get/set/delete contract every backend meets
//! - `KeyringStorage`: OS credential manager via keyring
//! - `VaultStorage`: passphrase-encrypted file for hosts without a keychain
//! - `MemoryStorage`: in-process map for tests and throwaway sessions
//! - `CredentialStore`: typed access to the three credential entries

pub mod credentials;
pub mod keychain;
pub mod memory;
pub mod vault;

use async_trait::async_trait;
use thiserror::Error;

pub use credentials::CredentialStore;
pub use keychain::KeyringStorage;
pub use memory::MemoryStorage;
pub use vault::VaultStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Async string key-value area for secrets.
///
/// `delete` of a missing key succeeds, so clearing is idempotent.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}
