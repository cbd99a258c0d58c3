//! API client with bearer-token injection and expired-token recovery.
//!
//! Every call runs through the same pipeline, fixed when the client is
//! built: caller-supplied stages, bearer auth, 401 recovery, request log,
//! then the transport.

use std::sync::Arc;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::storage::CredentialStore;

use super::middleware::{BearerAuth, Middleware, Next, RequestLog};
use super::refresh::{
    AuthExpiredHandler, HttpTokenRefresher, NoRefresh, RefreshOnUnauthorized, TokenRefresher,
};
use super::transport::{HttpTransport, Transport};
use super::{ApiError, ApiRequest, ApiResponse};

/// Authenticated API client.
/// Clone is cheap - the pipeline and transport are shared.
#[derive(Clone)]
pub struct ApiClient {
    stages: Arc<[Arc<dyn Middleware>]>,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn builder(config: &Config, store: Arc<CredentialStore>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: config.api_base_url.clone(),
            timeout: config.timeout(),
            refresh_path: config.refresh_path.clone(),
            store,
            transport: None,
            refresher: None,
            on_expired: None,
            extra: Vec::new(),
        }
    }

    /// Run a request through the pipeline and return the raw response
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        Next::new(&self.stages, self.transport.as_ref())
            .run(request)
            .await
    }

    /// Run a request and parse a successful body as `T`
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.execute(request).await?;
        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.text()));
        }
        response.json().map_err(|e| {
            debug!(path = %path, error = %e, "Response body did not match expected type");
            e
        })
    }

    async fn send_with_body<T, B>(&self, method: Method, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = ApiRequest::new(method, path).with_json(body)?;
        self.send(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::new(Method::GET, path)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_with_body(Method::POST, path, body).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_with_body(Method::PUT, path, body).await
    }

    pub async fn patch<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_with_body(Method::PATCH, path, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::new(Method::DELETE, path)).await
    }
}

pub struct ApiClientBuilder {
    base_url: String,
    timeout: std::time::Duration,
    refresh_path: Option<String>,
    store: Arc<CredentialStore>,
    transport: Option<Arc<dyn Transport>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    on_expired: Option<Arc<dyn AuthExpiredHandler>>,
    extra: Vec<Arc<dyn Middleware>>,
}

impl ApiClientBuilder {
    /// Replace the HTTP transport (tests, custom stacks)
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace the refresher chosen from `Config::refresh_path`
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Called whenever the client gives up and clears credentials
    pub fn on_auth_expired(mut self, handler: Arc<dyn AuthExpiredHandler>) -> Self {
        self.on_expired = Some(handler);
        self
    }

    /// Add a stage ahead of bearer auth
    pub fn with_middleware(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.extra.push(stage);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.base_url, self.timeout)?),
        };

        let refresher: Arc<dyn TokenRefresher> = match (self.refresher, self.refresh_path) {
            (Some(refresher), _) => refresher,
            (None, Some(path)) => Arc::new(HttpTokenRefresher::new(transport.clone(), path)),
            (None, None) => Arc::new(NoRefresh),
        };

        let mut stages: Vec<Arc<dyn Middleware>> = self.extra;
        stages.push(Arc::new(BearerAuth::new(self.store.clone())));
        stages.push(Arc::new(RefreshOnUnauthorized::new(
            self.store,
            refresher,
            self.on_expired,
        )));
        stages.push(Arc::new(RequestLog));

        Ok(ApiClient {
            stages: stages.into(),
            transport,
        })
    }
}
