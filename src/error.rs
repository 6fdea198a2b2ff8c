// Error handling module
// Defines the gateway error taxonomy shared by transport, dispatcher and upload

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to the backend
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Deadline elapsed before a response arrived
    #[error("Request timed out after {}ms", .deadline.as_millis())]
    Timeout { deadline: Duration },

    /// Network or connection failure below the HTTP layer
    #[error("Transport error ({kind}): {message}")]
    Transport { kind: &'static str, message: String },

    /// Backend answered with a non-2xx status
    #[error("HTTP error! status: {code} - {message}")]
    Status { code: u16, message: String },

    /// Token refresh failed or returned no token
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Upload rejected or interrupted
    #[error("Upload failed: {status} - {message}")]
    Upload { status: u16, message: String },

    /// Login credentials rejected by the backend
    #[error("Login rejected: {0}")]
    LoginRejected(String),

    /// Durable credential slot could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Status code carried by the error, if the backend produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { code, .. } => Some(*code),
            GatewayError::Upload { status, .. } if *status != 0 => Some(*status),
            _ => None,
        }
    }

    /// True for an authorization rejection (401)
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// True when the deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::Storage(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GatewayError::Timeout {
            deadline: Duration::from_millis(15000),
        };
        assert_eq!(err.to_string(), "Request timed out after 15000ms");

        let err = GatewayError::Status {
            code: 404,
            message: "Not Found".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error! status: 404 - Not Found");

        let err = GatewayError::Transport {
            kind: "connection_failed",
            message: "refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Transport error (connection_failed): refused"
        );
    }

    #[test]
    fn test_refresh_and_login_messages() {
        let err = GatewayError::RefreshFailed("no token in response".to_string());
        assert_eq!(
            err.to_string(),
            "Token refresh failed: no token in response"
        );

        let err = GatewayError::LoginRejected("bad password".to_string());
        assert_eq!(err.to_string(), "Login rejected: bad password");
    }

    #[test]
    fn test_internal_error_message() {
        let err = GatewayError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }

    #[test]
    fn test_status_accessors() {
        let err = GatewayError::Status {
            code: 401,
            message: String::new(),
        };
        assert_eq!(err.status(), Some(401));
        assert!(err.is_unauthorized());
        assert!(!err.is_timeout());

        let err = GatewayError::Upload {
            status: 0,
            message: "Network error occurred".to_string(),
        };
        assert_eq!(err.status(), None);

        let err = GatewayError::Upload {
            status: 401,
            message: "Unauthorized".to_string(),
        };
        assert!(err.is_unauthorized());

        let err = GatewayError::Timeout {
            deadline: Duration::from_secs(1),
        };
        assert!(err.is_timeout());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_storage_error_from_sqlite() {
        let err: GatewayError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, GatewayError::Storage(_)));
    }
}
