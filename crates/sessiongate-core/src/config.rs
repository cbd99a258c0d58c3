//! Application configuration management.
//!
//! Settings are read from `~/.config/sessiongate/config.json` when it
//! exists, then overridden from the environment (`API_BASE_URL`,
//! `API_TIMEOUT`, `API_REFRESH_PATH`, `SESSIONGATE_*`). The vault
//! passphrase is only ever taken from the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{KeyringStorage, MemoryStorage, SecureStorage, VaultStorage};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "sessiongate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Vault file name in the cache directory
const VAULT_FILE: &str = "credentials.vault";

const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

/// Request timeout when none is configured.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Environment variable holding the vault passphrase
pub const VAULT_PASSPHRASE_ENV: &str = "SESSIONGATE_VAULT_PASSPHRASE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Keyring,
    Vault,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyring" => Ok(StorageBackend::Keyring),
            "vault" => Ok(StorageBackend::Vault),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow!(
                "Unknown storage backend {:?} (expected keyring, vault or memory)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub api_timeout_ms: u64,
    /// Refresh endpoint path. Unset means tokens are never refreshed.
    pub refresh_path: Option<String>,
    pub storage: StorageBackend,
    pub keyring_service: String,
    pub vault_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            api_timeout_ms: DEFAULT_TIMEOUT_MS,
            refresh_path: None,
            storage: StorageBackend::default(),
            keyring_service: APP_NAME.to_string(),
            vault_path: None,
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// The config file alone, without environment overrides
    pub fn load_file() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Write to the config file, returning where it went
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// Override fields from environment variables, looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(timeout) = lookup("API_TIMEOUT") {
            match timeout.trim().parse::<u64>() {
                Ok(ms) => self.api_timeout_ms = ms,
                Err(_) => warn!(value = %timeout, "Ignoring invalid API_TIMEOUT"),
            }
        }
        if let Some(path) = lookup("API_REFRESH_PATH") {
            self.refresh_path = Some(path).filter(|p| !p.trim().is_empty());
        }
        if let Some(backend) = lookup("SESSIONGATE_STORAGE") {
            match backend.parse() {
                Ok(backend) => self.storage = backend,
                Err(e) => warn!(error = %e, "Ignoring SESSIONGATE_STORAGE"),
            }
        }
        if let Some(service) = lookup("SESSIONGATE_KEYRING_SERVICE") {
            self.keyring_service = service;
        }
        if let Some(path) = lookup("SESSIONGATE_VAULT_PATH") {
            self.vault_path = Some(PathBuf::from(path));
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Vault location: configured path, else the user cache directory
    pub fn vault_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.vault_path {
            return Ok(path.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(VAULT_FILE))
    }

    /// Build the configured storage backend
    pub fn open_storage(&self) -> Result<Arc<dyn SecureStorage>> {
        let storage: Arc<dyn SecureStorage> = match self.storage {
            StorageBackend::Keyring => Arc::new(KeyringStorage::new(self.keyring_service.clone())),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
            StorageBackend::Vault => {
                let passphrase = std::env::var(VAULT_PASSPHRASE_ENV)
                    .with_context(|| format!("{} must be set to use the vault", VAULT_PASSPHRASE_ENV))?;
                Arc::new(VaultStorage::open(self.vault_path()?, passphrase))
            }
        };
        Ok(storage)
    }
}
