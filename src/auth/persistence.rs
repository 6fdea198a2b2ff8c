// Durable key-value slot for credentials

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::error::{GatewayError, Result};

/// Key holding the bearer token
pub const TOKEN_KEY: &str = "authToken";

/// Key holding the logged-in user profile (JSON)
pub const USER_KEY: &str = "user";

/// Durable storage that outlives the process
pub trait CredentialSlot: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// SQLite-backed slot using an `auth_kv` table
pub struct SqliteSlot {
    conn: Mutex<Connection>,
}

impl SqliteSlot {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    GatewayError::Storage(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        tracing::debug!("Opening credential database: {}", path.display());
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Slot that lives only as long as this value
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| GatewayError::Storage("credential database lock poisoned".to_string()))?;
        f(&conn).map_err(GatewayError::from)
    }
}

impl CredentialSlot for SqliteSlot {
    fn load(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT value FROM auth_kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO auth_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                [key, value, now.as_str()],
            )
        })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM auth_kv WHERE key = ?", [key]))?;
        Ok(())
    }
}

/// Process-local slot, mostly for tests
#[derive(Default)]
pub struct MemorySlot {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-seeded with a token, as if persisted by a previous run
    pub fn with_token(token: &str) -> Self {
        let slot = Self::new();
        if let Ok(mut values) = slot.values.lock() {
            values.insert(TOKEN_KEY.to_string(), token.to_string());
        }
        slot
    }
}

impl CredentialSlot for MemorySlot {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| GatewayError::Storage("memory slot lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| GatewayError::Storage("memory slot lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| GatewayError::Storage("memory slot lock poisoned".to_string()))?;
        values.remove(key);
        Ok(())
    }
}
