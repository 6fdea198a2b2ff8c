use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use super::persistence::{CredentialSlot, TOKEN_KEY};
use super::types::SessionState;
use crate::error::Result;

/// Credential store
/// Holds the current bearer token in memory and mirrors it to a durable slot
pub struct CredentialStore {
    /// Current bearer token
    token: RwLock<Option<String>>,

    /// Durable storage, read once at construction
    slot: Arc<dyn CredentialSlot>,

    /// Bumped on every set/clear so waiters can tell the token changed
    generation: AtomicU64,

    /// Session state broadcast
    state_tx: watch::Sender<SessionState>,
}

impl CredentialStore {
    /// Create a store, hydrating the in-memory token from the slot
    pub fn new(slot: Arc<dyn CredentialSlot>) -> Result<Self> {
        let token = slot.load(TOKEN_KEY)?.filter(|t| !t.is_empty());

        let state = if token.is_some() {
            tracing::info!("Restored bearer token from credential storage");
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        };
        let (state_tx, _) = watch::channel(state);

        Ok(Self {
            token: RwLock::new(token),
            slot,
            generation: AtomicU64::new(0),
            state_tx,
        })
    }

    /// Current token, if any
    pub async fn read(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Store a new token in memory and in the durable slot.
    ///
    /// The in-memory value is updated even when persisting fails, so calls in
    /// this process keep working; the error is still returned.
    pub async fn set(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        {
            let mut current = self.token.write().await;
            *current = Some(token.clone());
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.state_tx.send_replace(SessionState::Authenticated);

        tracing::debug!(
            "Bearer token updated ({}...)",
            token.chars().take(8).collect::<String>()
        );

        self.slot.save(TOKEN_KEY, &token)
    }

    /// Remove the token from memory and storage
    pub async fn clear(&self) -> Result<()> {
        self.drop_token(SessionState::Unauthenticated).await
    }

    /// Remove the token after an irrecoverable refresh failure
    pub async fn expire(&self) -> Result<()> {
        tracing::warn!("Session expired, clearing bearer token");
        self.drop_token(SessionState::Expired).await
    }

    async fn drop_token(&self, state: SessionState) -> Result<()> {
        {
            let mut current = self.token.write().await;
            *current = None;
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.state_tx.send_replace(state);
        self.slot.remove(TOKEN_KEY)
    }

    /// Number of token changes since construction
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Watch session state transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Durable slot shared with the session service
    pub fn slot(&self) -> &Arc<dyn CredentialSlot> {
        &self.slot
    }
}
