// src/storage/mod.rs

//! SQLite persistence for postings and subscribers.
//!
//! One connection per database, behind a mutex. [`PostingStore`] and
//! [`SubscriberRegistry`] share the handle but never touch each other's
//! table.

pub mod postings;
pub mod subscribers;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::error::StorageError;

pub use postings::PostingStore;
pub use subscribers::SubscriberRegistry;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS postings (
    fingerprint       TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    company           TEXT NOT NULL,
    location          TEXT NOT NULL,
    salary_range      TEXT,
    category          TEXT NOT NULL,
    source_name       TEXT NOT NULL,
    url               TEXT NOT NULL,
    posted_at_ms      INTEGER,
    first_seen_at_ms  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_postings_first_seen ON postings(first_seen_at_ms);
CREATE INDEX IF NOT EXISTS idx_postings_category ON postings(category);
CREATE INDEX IF NOT EXISTS idx_postings_source ON postings(source_name);

CREATE TABLE IF NOT EXISTS subscribers (
    chat_id          INTEGER PRIMARY KEY,
    name             TEXT,
    is_active        INTEGER NOT NULL DEFAULT 1,
    category_filter  TEXT NOT NULL DEFAULT 'all',
    joined_at_ms     INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_subscribers_active ON subscribers(is_active, category_filter);
"#;

/// Shared handle to one SQLite database.
#[derive(Debug, Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database file and install the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    /// Private in-memory database; used by tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
        f(&mut guard)
    }
}

pub(crate) fn to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_ms(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StorageError::Corrupt(format!("timestamp {ms} out of range")))
}
