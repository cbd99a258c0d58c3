//! sessiongate-core - credential lifecycle and authenticated requests.
//!
//! This crate provides:
//! - `storage`: secured key-value backends and the typed `CredentialStore`
//! - `api`: the `ApiClient` middleware pipeline with one-shot token refresh
//! - `auth`: process session state (`SessionState`) and mock sign-in
//! - `models`: user profile, credential, and post types
//! - `config`: file and environment configuration
//!
//! Nothing here is a global. Build a `CredentialStore`, share it with a
//! `SessionState` and an `ApiClient`, and register the session as the
//! client's auth-expired handler so a failed refresh signs the user out.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError, PostsApi};
pub use auth::{AuthExpiredHandler, Screen, SessionSnapshot, SessionState, SessionStatus};
pub use config::Config;
pub use models::{AuthTokens, Credential, Post, PostDraft, UserProfile};
pub use storage::{CredentialStore, SecureStorage, StorageError};
