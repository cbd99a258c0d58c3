//! Request pipeline stages.
//!
//! A stage receives the request and a `Next` continuation over the stages
//! after it. It may rewrite the request, call `next.run` zero or more
//! times, and inspect or replace the response. The transport sits at the
//! end of the chain.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::storage::CredentialStore;

use super::{ApiError, ApiRequest, ApiResponse, Transport};

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError>;
}

/// The rest of the pipeline. `Copy`, so a stage can run it more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn new(stages: &'a [Arc<dyn Middleware>], transport: &'a dyn Transport) -> Self {
        Self { stages, transport }
    }

    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(request, Next::new(rest, self.transport))
                    .await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// Logs each request as it goes on the wire, retries included, and its
/// outcome. Sits last so `authenticated` reflects the headers actually sent.
/// Token values never reach the log.
pub struct RequestLog;

#[async_trait]
impl Middleware for RequestLog {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError> {
        let method = request.method.clone();
        let path = request.path.clone();
        debug!(
            method = %method,
            path = %path,
            authenticated = request.has_authorization(),
            "Request"
        );

        let result = next.run(request).await;
        match result {
            Ok(ref response) => debug!(method = %method, path = %path, status = %response.status, "Response"),
            Err(ref e) => warn!(method = %method, path = %path, error = %e, "Request failed"),
        }
        result
    }
}

/// Attaches `Authorization: Bearer <access token>` when the store holds a
/// token and the request doesn't already carry an `Authorization` header.
/// Without a token the request goes out unauthenticated.
pub struct BearerAuth {
    store: Arc<CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Middleware for BearerAuth {
    async fn handle(&self, mut request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, ApiError> {
        if !request.has_authorization() {
            if let Some(token) = self.store.access_token().await {
                request.attach_stored_token(&token)?;
            }
        }
        next.run(request).await
    }
}
