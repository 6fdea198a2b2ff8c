// Authentication types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Observable authentication state of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A bearer token is held
    Authenticated,
    /// No token, either never logged in or logged out
    Unauthenticated,
    /// Token was dropped after an irrecoverable refresh failure.
    /// The application should return to its unauthenticated entry point.
    Expired,
}

/// Result of one refresh attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new bearer token is now current
    Renewed(String),
    /// Refresh failed; nothing was mutated
    Failed(String),
}

/// Refresh endpoint response
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// Login request body
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Login endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Value,
}

/// Rejection body some backends send with a failed login
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub message: Option<String>,
}

/// Snapshot of the stored session
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStatus {
    pub is_logged_in: bool,
    pub user: Option<Value>,
}
