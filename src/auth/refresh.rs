// Token refresh logic

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::store::CredentialStore;
use super::types::{RefreshOutcome, RefreshResponse};
use crate::models::{Method, RequestEnvelope};
use crate::transport::DeadlineBoundTransport;

/// Exchanges the ambient session cookie for a new bearer token
pub struct TokenRefreshCoordinator {
    transport: Arc<DeadlineBoundTransport>,
    store: Arc<CredentialStore>,

    /// Fixed refresh path, e.g. `/auth/refresh`
    refresh_path: String,

    /// Deadline for the refresh call itself
    deadline: Duration,

    /// Serialize refreshes and reuse a token renewed by a concurrent caller
    coalesce: bool,
    gate: Mutex<()>,
}

impl TokenRefreshCoordinator {
    pub fn new(
        transport: Arc<DeadlineBoundTransport>,
        store: Arc<CredentialStore>,
        refresh_path: impl Into<String>,
        deadline: Duration,
        coalesce: bool,
    ) -> Self {
        Self {
            transport,
            store,
            refresh_path: refresh_path.into(),
            deadline,
            coalesce,
            gate: Mutex::new(()),
        }
    }

    pub fn refresh_path(&self) -> &str {
        &self.refresh_path
    }

    /// Perform one refresh call.
    ///
    /// Sent without an Authorization header and never retried on 401. On
    /// success the new token is written to the credential store; on failure
    /// nothing is mutated.
    pub async fn refresh(&self) -> RefreshOutcome {
        tracing::info!("Refreshing bearer token...");

        let envelope = RequestEnvelope::new(Method::Post, self.refresh_path.as_str())
            .with_auth(false)
            .with_deadline(self.deadline);

        let response = match self.transport.send(&envelope).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = %envelope.request_id, "Token refresh failed: {}", e);
                return RefreshOutcome::Failed(e.to_string());
            }
        };

        let token = serde_json::from_slice::<RefreshResponse>(&response.body)
            .ok()
            .and_then(|data| data.token)
            .filter(|t| !t.is_empty());

        let Some(token) = token else {
            tracing::error!(
                request_id = %envelope.request_id,
                "Refresh response does not contain a token"
            );
            return RefreshOutcome::Failed("refresh response does not contain a token".to_string());
        };

        if let Err(e) = self.store.set(token.clone()).await {
            // Token is current in memory; only persistence failed
            tracing::warn!("Failed to persist refreshed token: {}", e);
        }

        tracing::info!("Bearer token refreshed");
        RefreshOutcome::Renewed(token)
    }

    /// Refresh on behalf of a call that was rejected while the store was at
    /// `observed_generation`.
    ///
    /// Without coalescing every caller refreshes independently and the last
    /// write wins. With coalescing, refreshes run one at a time and a caller
    /// whose rejected token was already replaced reuses the replacement.
    pub async fn refresh_after(&self, observed_generation: u64) -> RefreshOutcome {
        if !self.coalesce {
            return self.refresh().await;
        }

        let _guard = self.gate.lock().await;

        if self.store.generation() != observed_generation {
            if let Some(token) = self.store.read().await {
                tracing::debug!("Token already renewed by a concurrent refresh");
                return RefreshOutcome::Renewed(token);
            }
        }

        self.refresh().await
    }
}
