//! SQLite storage layer for Murmur
//!
//! The session layer reaches persistence only through the repository
//! traits in [`traits`]; [`Database`] is the rusqlite-backed
//! implementation.

mod messages;
mod migrations;
mod parse;
mod traits;
mod users;

use std::path::Path;

use rusqlite::Connection;
use tracing::instrument;

use crate::error::Result;

pub use messages::MessageStore;
pub use traits::{MessageRepository, Storage, UserRepository};
pub use users::UserStore;

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    /// Get user store
    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(&self.conn)
    }

    /// Get message store
    pub fn messages(&self) -> MessageStore<'_> {
        MessageStore::new(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.schema_version() >= 1);
    }

    #[test]
    fn test_open_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.db");

        let db = Database::open(&path).unwrap();
        let version = db.schema_version();
        drop(db);

        // Reopening is idempotent
        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version(), version);
    }
}
