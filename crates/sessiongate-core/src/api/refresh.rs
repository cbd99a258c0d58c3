//! Expired-credential recovery.
//!
//! `RefreshOnUnauthorized` turns a 401 into at most one refresh and one
//! retry. Refreshes are single-flight: concurrent 401s queue on the
//! coordinator's lock, and whoever gets it second finds the new token
//! already stored and reuses it instead of calling the endpoint again.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::models::AuthTokens;
use crate::storage::CredentialStore;

use super::middleware::{Middleware, Next};
use super::{ApiError, ApiRequest, ApiResponse, Transport};

/// Notified when the client gives up on the stored credentials.
pub trait AuthExpiredHandler: Send + Sync {
    fn on_auth_expired(&self);
}

/// Exchanges a refresh token for a new access token.
///
/// `Ok(None)` means the refresh was refused; the caller treats it the same
/// as an error.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Option<AuthTokens>, ApiError>;
}

/// Used when no refresh endpoint is configured: never yields a token.
pub struct NoRefresh;

#[async_trait]
impl TokenRefresher for NoRefresh {
    async fn refresh(&self, _refresh_token: &str) -> Result<Option<AuthTokens>, ApiError> {
        warn!("No refresh endpoint configured, cannot renew access token");
        Ok(None)
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: Option<String>,
}

/// `POST {refreshToken} -> {accessToken, refreshToken?}` against the
/// transport directly, so the call never re-enters the 401 handling.
pub struct HttpTokenRefresher {
    transport: Arc<dyn Transport>,
    path: String,
}

impl HttpTokenRefresher {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<Option<AuthTokens>, ApiError> {
        let request = ApiRequest::post(self.path.clone()).with_json(&RefreshRequest { refresh_token })?;
        let response = self.transport.send(request).await?;

        match response.status {
            status if status.is_success() => {
                let body: RefreshResponse = response.json()?;
                Ok(Some(AuthTokens {
                    access_token: body.access_token,
                    refresh_token: body.refresh_token,
                }))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!(status = %response.status, "Refresh token rejected");
                Ok(None)
            }
            status => Err(ApiError::from_status(status, &response.text())),
        }
    }
}

/// Serializes refreshes and stores their result.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    in_flight: Mutex<()>,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            in_flight: Mutex::new(()),
        }
    }

    /// Get a usable access token after a 401. `attached` is the stored
    /// token the rejected request carried, or `None` when its header did not
    /// come from the store, in which case a refresh is always attempted.
    /// Returns `Ok(None)` when the session can't be recovered. Only a
    /// failure to store the new token is an error.
    pub async fn refresh(&self, attached: Option<&str>) -> Result<Option<String>, ApiError> {
        let _guard = self.in_flight.lock().await;

        // Another request may have refreshed while we waited for the lock
        if let Some(attached) = attached {
            if let Some(current) = self.store.access_token().await {
                if current != attached {
                    debug!("Access token already refreshed, reusing it");
                    return Ok(Some(current));
                }
            }
        }

        let Some(refresh_token) = self.store.refresh_token().await else {
            debug!("No refresh token stored, skipping refresh");
            return Ok(None);
        };

        match self.refresher.refresh(&refresh_token).await {
            Ok(Some(tokens)) => {
                self.store.store_tokens(&tokens).await?;
                info!("Access token refreshed");
                Ok(Some(tokens.access_token))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                Ok(None)
            }
        }
    }
}

/// Pipeline stage implementing the 401 recovery protocol:
///
/// 1. Non-401 responses pass through untouched.
/// 2. A 401 on a request already retried is terminal.
/// 3. Otherwise refresh, re-issue the request once with the new token, and
///    return that outcome as final. A second 401 is terminal.
///
/// Terminal outcomes clear the stored credentials, notify the
/// `AuthExpiredHandler`, and return `ApiError::AuthExpired`.
pub struct RefreshOnUnauthorized {
    store: Arc<CredentialStore>,
    coordinator: RefreshCoordinator,
    on_expired: Option<Arc<dyn AuthExpiredHandler>>,
}

impl RefreshOnUnauthorized {
    pub fn new(
        store: Arc<CredentialStore>,
        refresher: Arc<dyn TokenRefresher>,
        on_expired: Option<Arc<dyn AuthExpiredHandler>>,
    ) -> Self {
        Self {
            coordinator: RefreshCoordinator::new(store.clone(), refresher),
            store,
            on_expired,
        }
    }

    async fn expire(&self, request: &ApiRequest) -> ApiError {
        warn!(method = %request.method, path = %request.path, "Credentials expired, signing out");
        if let Err(e) = self.store.clear().await {
            error!(error = %e, "Failed to clear credentials after expiry");
        }
        if let Some(ref handler) = self.on_expired {
            handler.on_auth_expired();
        }
        ApiError::AuthExpired
    }
}

#[async_trait]
impl Middleware for RefreshOnUnauthorized {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError> {
        let response = next.run(request.clone()).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }
        if request.is_retry() {
            return Err(self.expire(&request).await);
        }

        let attached = request.stored_token().map(str::to_owned);
        let Some(token) = self.coordinator.refresh(attached.as_deref()).await? else {
            return Err(self.expire(&request).await);
        };

        let mut retry = request;
        retry.mark_retry();
        retry.attach_stored_token(&token)?;
        debug!(method = %retry.method, path = %retry.path, "Retrying with refreshed token");

        let response = next.run(retry.clone()).await?;
        if response.is_unauthorized() {
            return Err(self.expire(&retry).await);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Refresher that counts calls and hands out a fixed answer
    struct CountingRefresher {
        calls: AtomicUsize,
        answer: Option<AuthTokens>,
    }

    impl CountingRefresher {
        fn new(answer: Option<AuthTokens>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                answer,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<Option<AuthTokens>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    fn store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())))
    }

    #[tokio::test]
    async fn test_no_refresh_token_skips_refresher() {
        let store = store();
        store.set_access_token("t1").await.unwrap();
        let refresher = CountingRefresher::new(Some(AuthTokens::new("t2")));
        let coordinator = RefreshCoordinator::new(store, refresher.clone());

        assert_eq!(coordinator.refresh(Some("t1")).await.unwrap(), None);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_stores_rotated_tokens() {
        let store = store();
        store
            .store_tokens(&AuthTokens::new("t1").with_refresh_token("r1"))
            .await
            .unwrap();
        let refresher = CountingRefresher::new(Some(AuthTokens::new("t2").with_refresh_token("r2")));
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        assert_eq!(coordinator.refresh(Some("t1")).await.unwrap().as_deref(), Some("t2"));
        assert_eq!(store.access_token().await.as_deref(), Some("t2"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("r2"));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_already_refreshed_token_is_reused() {
        let store = store();
        store
            .store_tokens(&AuthTokens::new("t2").with_refresh_token("r1"))
            .await
            .unwrap();
        let refresher = CountingRefresher::new(Some(AuthTokens::new("t3")));
        let coordinator = RefreshCoordinator::new(store, refresher.clone());

        // The rejected request carried t1, but t2 is already stored
        assert_eq!(coordinator.refresh(Some("t1")).await.unwrap().as_deref(), Some("t2"));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_caller_supplied_header_always_refreshes() {
        let store = store();
        store
            .store_tokens(&AuthTokens::new("stored").with_refresh_token("r1"))
            .await
            .unwrap();
        let refresher = CountingRefresher::new(Some(AuthTokens::new("t2")));
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        // The rejected request's header was not a stored token, so "stored"
        // is no evidence of a newer refresh
        assert_eq!(coordinator.refresh(None).await.unwrap().as_deref(), Some("t2"));
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.access_token().await.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_refused_refresh_is_none() {
        let store = store();
        store
            .store_tokens(&AuthTokens::new("t1").with_refresh_token("r1"))
            .await
            .unwrap();
        let refresher = CountingRefresher::new(None);
        let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

        assert_eq!(coordinator.refresh(Some("t1")).await.unwrap(), None);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(store.access_token().await.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_no_refresh_never_yields_a_token() {
        assert_eq!(NoRefresh.refresh("r1").await.unwrap(), None);
    }
}
