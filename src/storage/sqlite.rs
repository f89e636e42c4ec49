//! SQLite-backed key-value store — the durable primary medium.
//!
//! One `meta(key, value)` table, shared by every store instance that opens
//! the same database file. Connections use interior mutability via
//! `parking_lot::Mutex` so the backend is `Sync`.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use crate::error::StorageError;

use super::traits::KeyValueBackend;

/// Durable key-value backend over a SQLite database.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database. Data does not outlive the backend;
    /// useful in tests, not as a primary medium.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM meta WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set("k", "v").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn get_missing_returns_none() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert_eq!(backend.get("missing").unwrap(), None);
    }

    #[test]
    fn set_replaces_existing() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set("k", "old").unwrap();
        backend.set("k", "new").unwrap();
        assert_eq!(backend.get("k").unwrap(), Some("new".to_string()));
    }

    #[test]
    fn remove_is_idempotent() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.set("k", "v").unwrap();
        backend.remove("k").unwrap();
        backend.remove("k").unwrap();
        assert_eq!(backend.get("k").unwrap(), None);
    }

    #[test]
    fn two_backends_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");

        let a = SqliteBackend::open(&path).unwrap();
        let b = SqliteBackend::open(&path).unwrap();

        a.set("k", "from-a").unwrap();
        assert_eq!(b.get("k").unwrap(), Some("from-a".to_string()));
    }
}
