use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::GatewayError;

/// Endpoint paths used by the gateway itself
pub mod endpoints {
    pub const AUTH_LOGIN: &str = "/auth/login";
    pub const AUTH_REFRESH: &str = "/auth/refresh";
}

/// Default request deadline in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Default latency of synthetic responses in milliseconds
pub const DEFAULT_SYNTHETIC_LATENCY_MS: u64 = 300;

/// Backend Gateway command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the backend API
    #[arg(short = 'u', long, env = "API_BASE_URL", default_value = "http://localhost:5000/api")]
    pub base_url: String,

    /// Request deadline in milliseconds
    #[arg(short = 't', long, env = "API_TIMEOUT_MS", default_value = "15000")]
    pub timeout_ms: u64,

    /// Connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// Fall back to synthetic responses when the backend is unreachable
    #[arg(long, env = "SIMULATION_ALLOWED", default_value = "false")]
    pub simulation_allowed: bool,

    /// Latency of synthetic responses in milliseconds
    #[arg(long, env = "SYNTHETIC_LATENCY_MS", default_value = "300")]
    pub synthetic_latency_ms: u64,

    /// Serialize concurrent token refreshes
    #[arg(long, env = "COALESCE_REFRESH", default_value = "false")]
    pub coalesce_refresh: bool,

    /// Path to the SQLite credential database
    #[arg(short = 'd', long, env = "CREDENTIAL_DB_FILE")]
    pub db_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operations exposed by the CLI
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Log in and store the bearer token
    Login {
        username: String,
        /// Password (falls back to LOGIN_PASSWORD)
        #[arg(long, env = "LOGIN_PASSWORD")]
        password: String,
    },
    /// Forget the stored token and user
    Logout,
    /// Show whether a session is stored
    Status,
    /// GET a path
    Get {
        path: String,
        /// Send without the Authorization header
        #[arg(long)]
        no_auth: bool,
    },
    /// POST a JSON body to a path
    Post {
        path: String,
        body: String,
        #[arg(long)]
        no_auth: bool,
    },
    /// PUT a JSON body to a path
    Put {
        path: String,
        body: String,
        #[arg(long)]
        no_auth: bool,
    },
    /// DELETE a path
    Delete {
        path: String,
        #[arg(long)]
        no_auth: bool,
    },
    /// Upload a file as multipart form data
    Upload {
        path: String,
        file: PathBuf,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    // Backend
    pub api_base_url: String,

    // Timeouts
    pub request_timeout: Duration,
    pub connect_timeout: Duration,

    // Degraded mode
    pub simulation_allowed: bool,
    pub synthetic_latency: Duration,

    // Authentication
    pub refresh_path: String,
    pub coalesce_refresh: bool,
    pub credential_db_file: PathBuf,

    // Logging
    pub log_level: String,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            connect_timeout: Duration::from_secs(10),
            simulation_allowed: false,
            synthetic_latency: Duration::from_millis(DEFAULT_SYNTHETIC_LATENCY_MS),
            refresh_path: endpoints::AUTH_REFRESH.to_string(),
            coalesce_refresh: false,
            credential_db_file: default_db_path(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    ///
    /// Returns the subcommand alongside so the binary parses arguments once.
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Ok(Self::from_args(args))
    }

    /// Build a config from already-parsed arguments
    pub fn from_args(args: CliArgs) -> (Self, Command) {
        let config = Config {
            api_base_url: args.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_millis(args.timeout_ms),
            connect_timeout: Duration::from_secs(args.connect_timeout),
            simulation_allowed: args.simulation_allowed,
            synthetic_latency: Duration::from_millis(args.synthetic_latency_ms),
            refresh_path: endpoints::AUTH_REFRESH.to_string(),
            coalesce_refresh: args.coalesce_refresh,
            credential_db_file: args
                .db_file
                .map(|s| expand_tilde(&s))
                .unwrap_or_else(default_db_path),
            log_level: args.log_level,
            log_json: args.log_json,
        };

        (config, args.command)
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        if let Err(e) = reqwest::Url::parse(&self.api_base_url) {
            return Err(GatewayError::ConfigError(format!(
                "API_BASE_URL is not a valid URL: {} ({})",
                self.api_base_url, e
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(GatewayError::ConfigError(
                "API_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Config pointing at a local backend
    #[cfg(test)]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            api_base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            credential_db_file: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }
}

/// Default location of the credential database
fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("backend-gateway").join("credentials.sqlite3"))
        .unwrap_or_else(|| PathBuf::from("credentials.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
