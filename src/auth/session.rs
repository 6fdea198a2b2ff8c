// Login, logout and stored-session status

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::persistence::USER_KEY;
use super::store::CredentialStore;
use super::types::{AuthStatus, ErrorBody, LoginRequest, LoginResponse};
use crate::config::endpoints;
use crate::error::{GatewayError, Result};
use crate::models::{Method, RequestEnvelope};
use crate::transport::DeadlineBoundTransport;

const DEFAULT_LOGIN_ERROR: &str = "Invalid username or password";

/// Session service
/// Issues credentials through the login endpoint and forgets them on logout.
/// Login talks to the real backend only: it never triggers a refresh and never
/// falls back to simulated responses.
pub struct SessionService {
    transport: Arc<DeadlineBoundTransport>,
    store: Arc<CredentialStore>,
    deadline: Duration,
}

impl SessionService {
    pub fn new(
        transport: Arc<DeadlineBoundTransport>,
        store: Arc<CredentialStore>,
        deadline: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            deadline,
        }
    }

    /// Log in, storing the bearer token and user profile
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let body = serde_json::to_value(LoginRequest { username, password })
            .map_err(|e| GatewayError::Internal(e.into()))?;

        let envelope = RequestEnvelope::new(Method::Post, endpoints::AUTH_LOGIN)
            .with_auth(false)
            .with_body(Some(body))
            .with_deadline(self.deadline);

        let response = match self.transport.send_direct(&envelope).await {
            Ok(response) => response,
            Err(GatewayError::Status { code, message }) => {
                let reason = serde_json::from_str::<ErrorBody>(&message)
                    .ok()
                    .and_then(|b| b.message)
                    .unwrap_or_else(|| DEFAULT_LOGIN_ERROR.to_string());
                tracing::warn!(status = code, "Login rejected: {}", reason);
                return Err(GatewayError::LoginRejected(reason));
            }
            Err(e) => return Err(e),
        };

        let data: LoginResponse = serde_json::from_slice(&response.body)
            .map_err(|_| GatewayError::LoginRejected(DEFAULT_LOGIN_ERROR.to_string()))?;

        let token = data
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                GatewayError::LoginRejected("login response does not contain a token".to_string())
            })?;

        self.store.set(token).await?;
        self.store.slot().save(USER_KEY, &data.user.to_string())?;

        tracing::info!(username = username, "✅ Logged in");
        Ok(data)
    }

    /// Forget the stored token and user
    pub async fn logout(&self) -> Result<()> {
        self.store.clear().await?;
        if let Err(e) = self.store.slot().remove(USER_KEY) {
            tracing::warn!("Logout failed to remove stored user: {}", e);
        }
        tracing::info!("Logged out");
        Ok(())
    }

    /// Logged in iff both a token and a stored user exist
    pub async fn status(&self) -> AuthStatus {
        let token = self.store.read().await;
        let user = self
            .store
            .slot()
            .load(USER_KEY)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());

        match (token, user) {
            (Some(_), Some(user)) => AuthStatus {
                is_logged_in: true,
                user: Some(user),
            },
            _ => AuthStatus {
                is_logged_in: false,
                user: None,
            },
        }
    }
}
