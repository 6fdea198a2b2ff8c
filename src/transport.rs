use anyhow::Context;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::degraded::DegradedModeSwitch;
use crate::error::GatewayError;
use crate::models::{RequestEnvelope, TransportResponse};

/// Deadline-bound HTTP transport with degraded-mode fallback
pub struct DeadlineBoundTransport {
    /// Shared HTTP client with connection pooling and a cookie jar
    client: Client,

    /// Backend base URL without trailing slash
    base_url: String,

    /// Sticky fallback flag
    degraded: Arc<DegradedModeSwitch>,

    /// Non-production builds may fall back to synthetic responses
    simulation_allowed: bool,

    /// Delay before a synthetic response is returned
    synthetic_latency: Duration,
}

impl DeadlineBoundTransport {
    /// Create a new transport
    pub fn new(config: &Config, degraded: Arc<DegradedModeSwitch>) -> anyhow::Result<Self> {
        // No overall client timeout: deadlines are per call
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .cookie_store(true)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            degraded,
            simulation_allowed: config.simulation_allowed,
            synthetic_latency: config.synthetic_latency,
        })
    }

    /// Send one envelope, bounded by its deadline.
    ///
    /// With simulation allowed, a transport fault degrades the process and the
    /// same envelope is answered synthetically. At most one real attempt is made.
    pub async fn send(&self, envelope: &RequestEnvelope) -> Result<TransportResponse, GatewayError> {
        let mut fell_back = false;

        loop {
            if self.simulation_allowed && self.degraded.is_degraded() {
                return Ok(self.synthetic(envelope).await);
            }

            match self.send_real(envelope).await {
                Err(GatewayError::Transport { kind, message })
                    if self.simulation_allowed && !fell_back =>
                {
                    tracing::warn!(
                        request_id = %envelope.request_id,
                        error_kind = kind,
                        error = %message,
                        "Real API unreachable, retrying against simulated backend"
                    );
                    self.degraded.degrade();
                    fell_back = true;
                }
                other => return other,
            }
        }
    }

    /// Send one envelope to the real backend only.
    ///
    /// Ignores the degraded switch and never flips it: a transport fault is
    /// returned as-is.
    pub async fn send_direct(
        &self,
        envelope: &RequestEnvelope,
    ) -> Result<TransportResponse, GatewayError> {
        self.send_real(envelope).await
    }

    /// Synthetic success after the configured latency
    async fn synthetic(&self, envelope: &RequestEnvelope) -> TransportResponse {
        tracing::debug!(
            request_id = %envelope.request_id,
            method = %envelope.method,
            url = %self.url(&envelope.path),
            "Simulated fetch"
        );
        tokio::time::sleep(self.synthetic_latency).await;
        TransportResponse::synthetic()
    }

    /// One real HTTP attempt raced against the envelope deadline
    async fn send_real(&self, envelope: &RequestEnvelope) -> Result<TransportResponse, GatewayError> {
        let url = self.url(&envelope.path);

        tracing::debug!(
            request_id = %envelope.request_id,
            method = %envelope.method,
            url = %url,
            deadline_ms = envelope.deadline.as_millis() as u64,
            "Sending HTTP request"
        );

        let mut builder = self
            .client
            .request(envelope.method.into(), &url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        if let Some(auth) = envelope.authorization() {
            builder = builder.header(AUTHORIZATION, auth);
        }

        if let Some(body) = envelope.body() {
            builder = builder.json(body);
        }

        let call = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        // Dropping `call` on expiry aborts the in-flight request
        let (status, body) = match tokio::time::timeout(envelope.deadline, call).await {
            Err(_) => {
                tracing::warn!(
                    request_id = %envelope.request_id,
                    url = %url,
                    deadline_ms = envelope.deadline.as_millis() as u64,
                    "HTTP request deadline elapsed"
                );
                return Err(GatewayError::Timeout {
                    deadline: envelope.deadline,
                });
            }
            Ok(Err(e)) => return Err(classify_error(&e, envelope, &url)),
            Ok(Ok(result)) => result,
        };

        if status.is_success() {
            tracing::debug!(
                request_id = %envelope.request_id,
                status = %status,
                "Request successful"
            );
            return Ok(TransportResponse {
                status: status.as_u16(),
                body,
                synthetic: false,
            });
        }

        let message = String::from_utf8_lossy(&body).into_owned();
        tracing::warn!(
            request_id = %envelope.request_id,
            status = status.as_u16(),
            url = %url,
            response_body = %message,
            "Received error response"
        );

        Err(GatewayError::Status {
            code: status.as_u16(),
            message,
        })
    }

    /// Absolute URL for a backend path
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Degraded-mode switch observed by this transport
    pub fn degraded(&self) -> &Arc<DegradedModeSwitch> {
        &self.degraded
    }
}

/// Map a reqwest failure onto the gateway taxonomy
fn classify_error(e: &reqwest::Error, envelope: &RequestEnvelope, url: &str) -> GatewayError {
    // Connect timeouts are reported as timeouts by reqwest but are a fault of the link
    let error_kind = if e.is_connect() {
        "connection_failed"
    } else if e.is_timeout() {
        "timeout"
    } else if e.is_request() {
        "request_error"
    } else if e.is_body() {
        "body_error"
    } else if e.is_decode() {
        "decode_error"
    } else {
        "unknown"
    };

    tracing::warn!(
        request_id = %envelope.request_id,
        error_kind = error_kind,
        error = %e,
        error_debug = ?e,
        url = %url,
        "HTTP request error"
    );

    if error_kind == "timeout" {
        return GatewayError::Timeout {
            deadline: envelope.deadline,
        };
    }

    GatewayError::Transport {
        kind: error_kind,
        message: e.to_string(),
    }
}
