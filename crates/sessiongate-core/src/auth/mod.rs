//! Authentication module for the process-wide session.
//!
//! This module provides:
//! - `SessionState`: anonymous / authenticated / loading state backed by the
//!   credential store
//! - `Screen`: the navigation gate's choice for each status
//! - `MockAuthenticator`: fake credential exchange for development
//!
//! Register the `SessionState` as the API client's `AuthExpiredHandler` so
//! a failed token refresh signs the user out.

pub mod mock;
pub mod session;

pub use crate::api::AuthExpiredHandler;
pub use mock::MockAuthenticator;
pub use session::{Screen, SessionSnapshot, SessionState, SessionStatus};
