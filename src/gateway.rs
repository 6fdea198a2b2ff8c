// Wiring of the gateway services

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::auth::{
    CredentialSlot, CredentialStore, SessionService, SqliteSlot, TokenRefreshCoordinator,
};
use crate::config::Config;
use crate::degraded::DegradedModeSwitch;
use crate::dispatcher::AuthenticatedRequestDispatcher;
use crate::transport::DeadlineBoundTransport;
use crate::upload::UploadChannel;

/// All gateway services sharing one credential store and degraded-mode switch
#[derive(Clone)]
pub struct Gateway {
    pub store: Arc<CredentialStore>,
    pub degraded: Arc<DegradedModeSwitch>,
    pub transport: Arc<DeadlineBoundTransport>,
    pub refresher: Arc<TokenRefreshCoordinator>,
    pub dispatcher: Arc<AuthenticatedRequestDispatcher>,
    pub upload: Arc<UploadChannel>,
    pub session: Arc<SessionService>,
}

impl Gateway {
    /// Build a gateway persisting credentials in the configured SQLite database
    pub fn new(config: &Config) -> Result<Self> {
        tracing::info!(
            "Opening credential database: {}",
            config.credential_db_file.display()
        );
        let slot = SqliteSlot::open(&config.credential_db_file)
            .context("Failed to open credential database")?;
        Self::with_slot(config, Arc::new(slot), Arc::new(DegradedModeSwitch::new()))
    }

    /// Build a gateway around explicit shared state
    pub fn with_slot(
        config: &Config,
        slot: Arc<dyn CredentialSlot>,
        degraded: Arc<DegradedModeSwitch>,
    ) -> Result<Self> {
        let store = Arc::new(CredentialStore::new(slot).context("Failed to load credentials")?);
        let transport = Arc::new(DeadlineBoundTransport::new(config, degraded.clone())?);

        let refresher = Arc::new(TokenRefreshCoordinator::new(
            transport.clone(),
            store.clone(),
            config.refresh_path.clone(),
            config.request_timeout,
            config.coalesce_refresh,
        ));

        let dispatcher = Arc::new(AuthenticatedRequestDispatcher::new(
            transport.clone(),
            store.clone(),
            refresher.clone(),
            config.request_timeout,
        ));

        let upload = Arc::new(UploadChannel::new(transport.clone(), store.clone()));
        let session = Arc::new(SessionService::new(
            transport.clone(),
            store.clone(),
            config.request_timeout,
        ));

        Ok(Self {
            store,
            degraded,
            transport,
            refresher,
            dispatcher,
            upload,
            session,
        })
    }
}
