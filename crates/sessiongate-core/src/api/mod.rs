//! REST API client module.
//!
//! This module provides the `ApiClient` for JSON requests against the
//! configured base URL. Requests carry the stored access token as a bearer
//! header; a 401 triggers one refresh-and-retry before the session is
//! declared expired.

pub mod client;
pub mod error;
pub mod middleware;
pub mod posts;
pub mod refresh;
pub mod request;
pub mod transport;

pub use client::{ApiClient, ApiClientBuilder};
pub use error::ApiError;
pub use middleware::{Middleware, Next};
pub use posts::PostsApi;
pub use refresh::{AuthExpiredHandler, HttpTokenRefresher, NoRefresh, TokenRefresher};
pub use request::{ApiRequest, ApiResponse};
pub use transport::{HttpTransport, Transport};
