use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::api::AuthExpiredHandler;
use crate::models::{AuthTokens, UserProfile};
use crate::storage::{CredentialStore, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Startup, before `hydrate` has read the credential store
    Loading,
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Present only while authenticated
    pub user: Option<UserProfile>,
}

impl SessionSnapshot {
    fn loading() -> Self {
        Self {
            status: SessionStatus::Loading,
            user: None,
        }
    }

    fn anonymous() -> Self {
        Self {
            status: SessionStatus::Anonymous,
            user: None,
        }
    }

    fn authenticated(user: UserProfile) -> Self {
        Self {
            status: SessionStatus::Authenticated,
            user: Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }
}

/// Which top-level screen tree to show for a session status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Splash,
    Auth,
    Main,
}

impl Screen {
    pub fn for_status(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Loading => Screen::Splash,
            SessionStatus::Anonymous => Screen::Auth,
            SessionStatus::Authenticated => Screen::Main,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Screen::Splash => "splash",
            Screen::Auth => "sign-in",
            Screen::Main => "main",
        }
    }
}

/// Single source of truth for "is there a signed-in user".
///
/// Transitions that touch storage persist first and update memory second,
/// so a crash in between never shows a signed-in UI over missing tokens.
/// Observers follow changes through `subscribe`.
pub struct SessionState {
    store: Arc<CredentialStore>,
    state: watch::Sender<SessionSnapshot>,
}

impl SessionState {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::loading());
        Self { store, state }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn screen(&self) -> Screen {
        Screen::for_status(self.status())
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionSnapshot) {
        let previous = self.state.send_replace(next);
        let current = self.state.borrow();
        if previous.status != current.status {
            info!(from = ?previous.status, to = ?current.status, "Session transition");
        }
    }

    /// Derive the session from stored credentials: authenticated only when
    /// both a user profile and an access token are present.
    pub async fn hydrate(&self) -> SessionStatus {
        let (user, token) = futures::join!(self.store.user(), self.store.access_token());
        match (user, token) {
            (Some(user), Some(_)) => self.transition(SessionSnapshot::authenticated(user)),
            _ => self.transition(SessionSnapshot::anonymous()),
        }
        self.status()
    }

    /// Persist `user` and mark the session authenticated. Call after the
    /// credential exchange has stored its tokens. On a storage failure the
    /// session is left as it was.
    pub async fn login(&self, user: UserProfile) -> Result<(), StorageError> {
        self.store.set_user(&user).await?;
        self.transition(SessionSnapshot::authenticated(user));
        Ok(())
    }

    /// Store tokens from a credential exchange and the user, then go
    /// authenticated. If any write fails the store is cleared again and the
    /// session is left as it was.
    pub async fn sign_in(&self, tokens: &AuthTokens, user: UserProfile) -> Result<(), StorageError> {
        let stored = match self.store.store_tokens(tokens).await {
            Ok(()) => self.store.set_user(&user).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            if let Err(clear_err) = self.store.clear().await {
                error!(error = %clear_err, "Failed to roll back credentials after sign-in failure");
            }
            return Err(e);
        }
        self.transition(SessionSnapshot::authenticated(user));
        Ok(())
    }

    /// Clear stored credentials and go anonymous. If clearing fails the
    /// error is returned and the session keeps its current state, since
    /// the credentials would come back on the next `hydrate`.
    pub async fn logout(&self) -> Result<(), StorageError> {
        self.store.clear().await?;
        self.transition(SessionSnapshot::anonymous());
        Ok(())
    }

    /// The API client gave up on the stored credentials
    pub fn on_auth_expired(&self) {
        self.transition(SessionSnapshot::anonymous());
    }
}

impl AuthExpiredHandler for SessionState {
    fn on_auth_expired(&self) {
        SessionState::on_auth_expired(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, SecureStorage};
    use async_trait::async_trait;

    /// Reads work, deletes fail
    #[derive(Default)]
    struct UndeletableStorage {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl SecureStorage for UndeletableStorage {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("read-only keychain".to_string()))
        }
    }

    /// Writes to the user entry fail, everything else works
    #[derive(Default)]
    struct UserRejectingStorage {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl SecureStorage for UserRejectingStorage {
        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == crate::storage::credentials::USER_KEY {
                return Err(StorageError::Unavailable("keychain full".to_string()));
            }
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key).await
        }
    }

    fn store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(Arc::new(MemoryStorage::new())))
    }

    fn user() -> UserProfile {
        UserProfile::new("1", "a@x.com")
    }

    #[test]
    fn test_starts_loading() {
        let session = SessionState::new(store());
        assert_eq!(session.status(), SessionStatus::Loading);
        assert_eq!(session.screen(), Screen::Splash);
        assert_eq!(session.user(), None);
    }

    #[tokio::test]
    async fn test_hydrate_with_user_and_token() {
        let store = store();
        store.set_access_token("t1").await.unwrap();
        store.set_user(&user()).await.unwrap();

        let session = SessionState::new(store);
        assert_eq!(session.hydrate().await, SessionStatus::Authenticated);
        assert_eq!(session.user(), Some(user()));
        assert_eq!(session.screen(), Screen::Main);
    }

    #[tokio::test]
    async fn test_hydrate_needs_both_user_and_token() {
        let only_token = store();
        only_token.set_access_token("t1").await.unwrap();
        assert_eq!(
            SessionState::new(only_token).hydrate().await,
            SessionStatus::Anonymous
        );

        let only_user = store();
        only_user.set_user(&user()).await.unwrap();
        assert_eq!(
            SessionState::new(only_user).hydrate().await,
            SessionStatus::Anonymous
        );

        assert_eq!(SessionState::new(store()).hydrate().await, SessionStatus::Anonymous);
    }

    #[tokio::test]
    async fn test_login_survives_restart() {
        let store = store();
        let session = SessionState::new(store.clone());
        session
            .sign_in(&AuthTokens::new("t1").with_refresh_token("r1"), user())
            .await
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Authenticated);

        let restarted = SessionState::new(store);
        restarted.hydrate().await;
        assert_eq!(restarted.user(), Some(user()));
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_no_tokens_behind() {
        let store = Arc::new(CredentialStore::new(Arc::new(UserRejectingStorage::default())));
        let session = SessionState::new(store.clone());

        let result = session
            .sign_in(&AuthTokens::new("t1").with_refresh_token("r1"), user())
            .await;

        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert!(store.load().await.is_empty());
        assert_eq!(session.status(), SessionStatus::Loading);
    }

    #[tokio::test]
    async fn test_logout_clears_everything_twice() {
        let store = store();
        let session = SessionState::new(store.clone());
        session
            .sign_in(&AuthTokens::new("t1").with_refresh_token("r1"), user())
            .await
            .unwrap();

        session.logout().await.unwrap();
        session.logout().await.unwrap();

        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_logout_keeps_session() {
        let store = Arc::new(CredentialStore::new(Arc::new(UndeletableStorage::default())));
        let session = SessionState::new(store);
        session.sign_in(&AuthTokens::new("t1"), user()).await.unwrap();

        assert!(session.logout().await.is_err());
        assert_eq!(session.status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn test_auth_expired_goes_anonymous_and_notifies() {
        let session = SessionState::new(store());
        session.sign_in(&AuthTokens::new("t1"), user()).await.unwrap();
        let mut updates = session.subscribe();

        let handler: &dyn AuthExpiredHandler = &session;
        handler.on_auth_expired();

        assert!(updates.has_changed().unwrap());
        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.status, SessionStatus::Anonymous);
        assert_eq!(snapshot.user, None);
        assert_eq!(session.screen(), Screen::Auth);
    }
}
