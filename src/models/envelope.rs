// Outbound request description

use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::config::DEFAULT_TIMEOUT_MS;

/// HTTP verbs the gateway dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Only POST and PUT carry a JSON body
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// One logical outbound call.
///
/// The bearer token is resolved when the envelope is built for an attempt,
/// so a retried call picks up a credential renewed in between.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    pub method: Method,
    pub path: String,
    body: Option<Value>,
    pub with_auth: bool,
    bearer: Option<String>,
    pub deadline: Duration,
    pub request_id: String,
}

impl RequestEnvelope {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            with_auth: true,
            bearer: None,
            deadline: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            request_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
        }
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_auth(mut self, with_auth: bool) -> Self {
        self.with_auth = with_auth;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Attach the current credential. Ignored when the call does not require auth.
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    /// JSON body to send, if the method carries one
    pub fn body(&self) -> Option<&Value> {
        if self.method.carries_body() {
            self.body.as_ref()
        } else {
            None
        }
    }

    /// Value for the Authorization header, only for calls that require auth
    pub fn authorization(&self) -> Option<String> {
        if !self.with_auth {
            return None;
        }
        self.bearer.as_ref().map(|t| format!("Bearer {}", t))
    }
}
