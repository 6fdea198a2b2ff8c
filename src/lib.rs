// Backend Gateway - library root

pub mod auth;
pub mod config;
pub mod degraded;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod models;
pub mod transport;
pub mod upload;

pub use dispatcher::AuthenticatedRequestDispatcher;
pub use error::{GatewayError, Result};
pub use gateway::Gateway;
pub use transport::DeadlineBoundTransport;
pub use upload::{UploadChannel, UploadFile};
