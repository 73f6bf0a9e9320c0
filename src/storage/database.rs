use std::path::Path;

use rusqlite::{Connection, Result as SqlResult};

/// A sqlite connection whose schema is in place before anyone uses it.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (or creates) the file at `path` and applies `schema`.
    pub fn open<P: AsRef<Path>>(path: P, schema: &str) -> SqlResult<Self> {
        Self::prepare(Connection::open(path)?, schema)
    }

    pub fn in_memory(schema: &str) -> SqlResult<Self> {
        Self::prepare(Connection::open_in_memory()?, schema)
    }

    fn prepare(conn: Connection, schema: &str) -> SqlResult<Self> {
        conn.execute_batch(schema)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_applied_on_open() {
        let db = Database::in_memory("CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT);").unwrap();
        db.connection()
            .execute("INSERT INTO kv (key, value) VALUES ('a', 'b')", [])
            .unwrap();
    }

    #[test]
    fn broken_schema_is_an_error() {
        assert!(Database::in_memory("CREATE TABLE").is_err());
    }
}
