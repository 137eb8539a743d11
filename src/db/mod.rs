pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Malformed date {value:?} for show {show_id}")]
    MalformedDate { show_id: i64, value: String },
}

pub type Result<T> = std::result::Result<T, DbError>;

/// SQLite-backed performance record store.
pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than this build (v{SCHEMA_VERSION})"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: shows + performances
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS shows (
                id              INTEGER PRIMARY KEY,
                show_date       TEXT NOT NULL,
                venue_id        INTEGER,
                venue           TEXT NOT NULL DEFAULT '',
                city            TEXT NOT NULL DEFAULT '',
                state           TEXT NOT NULL DEFAULT '',
                country         TEXT NOT NULL DEFAULT '',
                tour_id         INTEGER,
                tour_name       TEXT,
                imported_at     TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_shows_date ON shows(show_date);

            CREATE TABLE IF NOT EXISTS performances (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                show_id         INTEGER NOT NULL REFERENCES shows(id) ON DELETE CASCADE,
                song            TEXT NOT NULL,
                slug            TEXT NOT NULL,
                set_label       TEXT NOT NULL,
                position        INTEGER NOT NULL,
                -- Shows since last played, as reported upstream
                gap             INTEGER,
                duration_secs   INTEGER,
                is_jamchart     INTEGER NOT NULL DEFAULT 0,
                footnote        TEXT,
                UNIQUE(show_id, set_label, position)
            );

            CREATE INDEX IF NOT EXISTS idx_performances_show ON performances(show_id);
            CREATE INDEX IF NOT EXISTS idx_performances_song ON performances(song);
            ",
        )?;
        Ok(())
    }
}

const SCHEMA_VERSION: i32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_sets_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i32 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.migrate().unwrap();
    }

    #[test]
    fn test_newer_schema_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(db.migrate(), Err(DbError::Migration(_))));
    }
}
