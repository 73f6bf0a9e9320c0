use std::path::Path;
use std::sync::Mutex;

use rusqlite::{OptionalExtension, Result as SqlResult, params};

use super::database::Database;

const TOKEN_KEY: &str = "token";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS session (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

/// Where the bearer token lives between runs.
///
/// Read on every remote call; never cached by callers.
pub trait SessionStore: Send + Sync {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str);
    fn clear(&self);
}

/// Session kept in a small sqlite key/value table.
pub struct SqliteSession {
    db: Mutex<Database>,
}

impl SqliteSession {
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        Ok(Self::with_database(Database::open(path, SCHEMA)?))
    }

    pub fn in_memory() -> SqlResult<Self> {
        Ok(Self::with_database(Database::in_memory(SCHEMA)?))
    }

    fn with_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn read(&self) -> SqlResult<Option<String>> {
        let db = self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        db.connection()
            .query_row(
                "SELECT value FROM session WHERE key = ?1",
                params![TOKEN_KEY],
                |row| row.get(0),
            )
            .optional()
    }

    fn write(&self, token: Option<&str>) -> SqlResult<()> {
        let db = self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match token {
            Some(token) => db.connection().execute(
                "INSERT OR REPLACE INTO session (key, value) VALUES (?1, ?2)",
                params![TOKEN_KEY, token],
            )?,
            None => db
                .connection()
                .execute("DELETE FROM session WHERE key = ?1", params![TOKEN_KEY])?,
        };
        Ok(())
    }
}

impl SessionStore for SqliteSession {
    fn token(&self) -> Option<String> {
        match self.read() {
            Ok(token) => token.filter(|token| !token.is_empty()),
            Err(err) => {
                log::error!("Failed to read session token: {err}");
                None
            }
        }
    }

    fn set_token(&self, token: &str) {
        if let Err(err) = self.write(Some(token)) {
            log::error!("Failed to store session token: {err}");
        }
    }

    fn clear(&self) {
        if let Err(err) = self.write(None) {
            log::error!("Failed to clear session token: {err}");
        }
    }
}

/// Process-local session, for tests and one-shot commands.
#[derive(Default)]
pub struct MemorySession {
    token: Mutex<Option<String>>,
}

impl MemorySession {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl SessionStore for MemorySession {
    fn token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_token(&self, token: &str) {
        *self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some(token.to_string());
    }

    fn clear(&self) {
        *self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
