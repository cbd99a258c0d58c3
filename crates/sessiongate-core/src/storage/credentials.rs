use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::{AuthTokens, Credential, UserProfile};

use super::{SecureStorage, StorageError};

/// Secured entry names
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

const ALL_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// Typed view over the three credential entries.
///
/// Reads never fail: a storage error is logged and reported as absent,
/// since reads are best-effort hydration. Writes and deletes return
/// `StorageError` so a failed write can't silently leave stale
/// credentials behind.
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to read credential, treating as absent");
                None
            }
        }
    }

    // ===== Access token =====

    pub async fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY).await
    }

    pub async fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.set(ACCESS_TOKEN_KEY, token).await
    }

    // ===== Refresh token =====

    pub async fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY).await
    }

    pub async fn set_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        self.storage.set(REFRESH_TOKEN_KEY, token).await
    }

    // ===== User =====

    /// Stored user profile. An entry that doesn't parse counts as absent.
    pub async fn user(&self) -> Option<UserProfile> {
        let raw = self.read(USER_KEY).await?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Stored user profile is not valid JSON, treating as absent");
                None
            }
        }
    }

    pub async fn set_user(&self, user: &UserProfile) -> Result<(), StorageError> {
        let json = serde_json::to_string(user)?;
        self.storage.set(USER_KEY, &json).await
    }

    // ===== Whole credential =====

    /// Store the result of a credential exchange. A missing refresh token
    /// leaves any stored one untouched.
    pub async fn store_tokens(&self, tokens: &AuthTokens) -> Result<(), StorageError> {
        self.set_access_token(&tokens.access_token).await?;
        if let Some(ref refresh_token) = tokens.refresh_token {
            self.set_refresh_token(refresh_token).await?;
        }
        Ok(())
    }

    pub async fn load(&self) -> Credential {
        let (access_token, refresh_token, user) =
            futures::join!(self.access_token(), self.refresh_token(), self.user());
        Credential {
            access_token,
            refresh_token,
            user,
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.storage.delete(key).await
    }

    /// Remove all three entries. Every delete is attempted; the first
    /// failure is returned.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in ALL_KEYS {
            if let Err(e) = self.storage.delete(key).await {
                warn!(key = key, error = %e, "Failed to delete credential");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Credentials cleared");
                Ok(())
            }
        }
    }
}
