pub mod migrations;
pub mod time;

use std::path::Path;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

pub use time::now_iso;

/// Owns the single `rusqlite::Connection` a project works against. All
/// writes go through `transaction`, matching the single-writer, no-shared-
/// mutable-state concurrency model the rest of the crate assumes.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if necessary) a database file at `path`, applying
    /// WAL mode and foreign key enforcement, then running any pending
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests and by callers that only need a
    /// scratch workspace for a single process lifetime.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let mut store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        let before = migrations::schema_version(&tx)?;
        let after = migrations::migrate_to_latest(&tx)?;
        tx.commit()?;
        if after != before {
            info!(from = before, to = after, "applied schema migrations");
        } else {
            debug!(version = after, "schema already current");
        }
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`. Callers needing finer-grained rollback boundaries (a single
    /// failing segment inside a larger job) should nest a savepoint of their
    /// own rather than opening a second top-level transaction.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let tx = self.conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_and_migrates_to_latest() {
        let store = Store::open_in_memory().unwrap();
        let version: i64 = store
            .connection()
            .query_row(
                "SELECT value FROM schema_meta WHERE key = 'schema_version'",
                [],
                |row| {
                    let raw: String = row.get(0)?;
                    Ok(raw.parse().unwrap())
                },
            )
            .unwrap();
        assert_eq!(version, migrations::current_schema_version());
    }

    #[test]
    fn reopening_is_idempotent() {
        let mut store = Store::open_in_memory().unwrap();
        store.migrate().unwrap();
        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM schema_meta", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let mut store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.transaction(|tx| {
            tx.execute(
                "INSERT INTO projects(id, name, slug, default_source_locale, default_target_locale, created_at, updated_at)
                 VALUES ('p1', 'Demo', 'demo', 'en', 'de', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Err(crate::error::CoreError::validation("forced rollback"))
        });
        assert!(result.is_err());
        let count: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
