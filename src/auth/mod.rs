// Authentication module
// Credential storage, token refresh and login/logout

mod types;
mod persistence;
mod store;
mod refresh;
mod session;

pub use persistence::{CredentialSlot, MemorySlot, SqliteSlot, TOKEN_KEY, USER_KEY};
pub use refresh::TokenRefreshCoordinator;
pub use session::SessionService;
pub use store::CredentialStore;
pub use types::{AuthStatus, LoginResponse, RefreshOutcome, SessionState};
