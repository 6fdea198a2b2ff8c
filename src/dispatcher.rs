use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialStore, RefreshOutcome, TokenRefreshCoordinator};
use crate::error::{GatewayError, Result};
use crate::models::{empty_result, Method, RequestEnvelope};
use crate::transport::DeadlineBoundTransport;

/// Builds and sends logical requests, applying the refresh-and-retry protocol
pub struct AuthenticatedRequestDispatcher {
    transport: Arc<DeadlineBoundTransport>,
    store: Arc<CredentialStore>,
    refresher: Arc<TokenRefreshCoordinator>,

    /// Deadline applied to every attempt
    default_deadline: Duration,
}

impl AuthenticatedRequestDispatcher {
    pub fn new(
        transport: Arc<DeadlineBoundTransport>,
        store: Arc<CredentialStore>,
        refresher: Arc<TokenRefreshCoordinator>,
        default_deadline: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            refresher,
            default_deadline,
        }
    }

    /// Send one logical request and return its parsed body.
    ///
    /// A 401 triggers one refresh followed by one retry with the renewed
    /// token. A 401 on the retry, or on the refresh path itself, is returned
    /// as-is. If the refresh fails the session is expired and
    /// `RefreshFailed` is returned. Empty or malformed bodies yield `{}`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        with_auth: bool,
    ) -> Result<Value> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        let is_refresh_path = path == self.refresher.refresh_path();
        let mut is_retry = false;

        loop {
            // Resolve the credential per attempt so the retry sees the renewed token
            let generation = self.store.generation();
            let bearer = if with_auth { self.store.read().await } else { None };

            let envelope = RequestEnvelope::new(method, path)
                .with_body(body.clone())
                .with_auth(with_auth)
                .with_deadline(self.default_deadline)
                .with_request_id(request_id.as_str())
                .with_bearer(bearer);

            let err = match self.transport.send(&envelope).await {
                Ok(response) => return Ok(response.json_or_empty()),
                Err(err) => err,
            };

            if !err.is_unauthorized() {
                return Err(err);
            }

            if is_refresh_path {
                // The renewal credential itself was rejected
                if let Err(e) = self.store.clear().await {
                    tracing::warn!("Failed to clear credentials: {}", e);
                }
                return Err(err);
            }

            if is_retry {
                tracing::warn!(
                    request_id = %request_id,
                    method = %method,
                    path = path,
                    "Request rejected again after token refresh"
                );
                return Err(err);
            }

            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = path,
                "Received 401, refreshing token and retrying..."
            );

            match self.refresher.refresh_after(generation).await {
                RefreshOutcome::Renewed(_) => is_retry = true,
                RefreshOutcome::Failed(reason) => {
                    if let Err(e) = self.store.expire().await {
                        tracing::warn!("Failed to clear credentials: {}", e);
                    }
                    return Err(GatewayError::RefreshFailed(reason));
                }
            }
        }
    }

    /// GET, returning `{}` on any failure
    pub async fn get(&self, path: &str, with_auth: bool) -> Value {
        self.swallow(Method::Get, path, None, with_auth).await
    }

    /// POST a JSON body, returning `{}` on any failure
    pub async fn post(&self, path: &str, data: Value, with_auth: bool) -> Value {
        self.swallow(Method::Post, path, Some(data), with_auth).await
    }

    /// PUT a JSON body, returning `{}` on any failure
    pub async fn put(&self, path: &str, data: Value, with_auth: bool) -> Value {
        self.swallow(Method::Put, path, Some(data), with_auth).await
    }

    /// DELETE, returning `{}` on any failure
    pub async fn delete(&self, path: &str, with_auth: bool) -> Value {
        self.swallow(Method::Delete, path, None, with_auth).await
    }

    async fn swallow(&self, method: Method, path: &str, body: Option<Value>, with_auth: bool) -> Value {
        match self.request(method, path, body, with_auth).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("[API] {} {} failed: {}", method, path, e);
                empty_result()
            }
        }
    }
}
