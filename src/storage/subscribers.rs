// src/storage/subscribers.rs

//! Subscriber registry. Records are never deleted; "unsubscribed" and
//! "blocked" are both `is_active = 0`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::{from_ms, to_ms, Db};
use crate::error::StorageError;
use crate::model::{Category, CategoryFilter, ChatId, Subscriber};

const COLUMNS: &str = "chat_id, name, is_active, category_filter, joined_at_ms";

struct SubscriberRow {
    chat_id: i64,
    name: Option<String>,
    is_active: bool,
    category_filter: String,
    joined_at_ms: i64,
}

impl SubscriberRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            chat_id: row.get(0)?,
            name: row.get(1)?,
            is_active: row.get(2)?,
            category_filter: row.get(3)?,
            joined_at_ms: row.get(4)?,
        })
    }
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = StorageError;

    fn try_from(r: SubscriberRow) -> Result<Self, Self::Error> {
        Ok(Subscriber {
            category_filter: r
                .category_filter
                .parse()
                .map_err(|e| StorageError::Corrupt(format!("subscriber {}: {e}", r.chat_id)))?,
            joined_at: from_ms(r.joined_at_ms)?,
            chat_id: r.chat_id,
            name: r.name,
            is_active: r.is_active,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberRegistry {
    db: Db,
}

impl SubscriberRegistry {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create or reactivate. An existing record keeps its filter and join
    /// time; a known name is only replaced by a new non-empty one.
    pub fn subscribe(&self, chat_id: ChatId, name: Option<&str>, now: DateTime<Utc>) -> Result<Subscriber, StorageError> {
        let name = name.map(str::trim).filter(|n| !n.is_empty());
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO subscribers (chat_id, name, is_active, category_filter, joined_at_ms) \
                 VALUES (?1, ?2, 1, 'all', ?3) \
                 ON CONFLICT(chat_id) DO UPDATE SET \
                    is_active = 1, \
                    name = COALESCE(excluded.name, subscribers.name)",
                params![chat_id, name, to_ms(now)],
            )?;
            Ok(())
        })?;
        self.get(chat_id)?
            .ok_or_else(|| StorageError::Corrupt(format!("subscriber {chat_id} vanished after upsert")))
    }

    /// `false` when the chat was never registered.
    pub fn unsubscribe(&self, chat_id: ChatId) -> Result<bool, StorageError> {
        self.set_active(chat_id, false)
    }

    /// Used by the notifier on permanent delivery failure.
    pub fn deactivate(&self, chat_id: ChatId) -> Result<bool, StorageError> {
        self.set_active(chat_id, false)
    }

    fn set_active(&self, chat_id: ChatId, active: bool) -> Result<bool, StorageError> {
        self.db.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE subscribers SET is_active = ?2 WHERE chat_id = ?1",
                params![chat_id, active],
            )?;
            Ok(n > 0)
        })
    }

    /// `false` when the chat was never registered; no record is created.
    pub fn set_filter(&self, chat_id: ChatId, filter: CategoryFilter) -> Result<bool, StorageError> {
        self.db.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE subscribers SET category_filter = ?2 WHERE chat_id = ?1",
                params![chat_id, filter.as_str()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn get(&self, chat_id: ChatId) -> Result<Option<Subscriber>, StorageError> {
        let row = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM subscribers WHERE chat_id = ?1"),
                    params![chat_id],
                    SubscriberRow::read,
                )
                .optional()?)
        })?;
        row.map(Subscriber::try_from).transpose()
    }

    /// Active subscribers; with `Some(category)`, only those whose filter
    /// is that category or "all".
    pub fn list_active(&self, category: Option<Category>) -> Result<Vec<Subscriber>, StorageError> {
        let rows: Vec<SubscriberRow> = self.db.with_conn(|conn| {
            let rows = match category {
                None => {
                    let mut stmt = conn.prepare_cached(&format!(
                        "SELECT {COLUMNS} FROM subscribers WHERE is_active = 1 ORDER BY chat_id"
                    ))?;
                    let rows = stmt.query_map([], SubscriberRow::read)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
                Some(c) => {
                    let mut stmt = conn.prepare_cached(&format!(
                        "SELECT {COLUMNS} FROM subscribers \
                         WHERE is_active = 1 AND (category_filter = 'all' OR category_filter = ?1) \
                         ORDER BY chat_id"
                    ))?;
                    let rows = stmt.query_map(params![c.slug()], SubscriberRow::read)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })?;
        rows.into_iter().map(Subscriber::try_from).collect()
    }

    pub fn count_all(&self) -> Result<usize, StorageError> {
        self.count("SELECT COUNT(*) FROM subscribers")
    }

    pub fn count_active(&self) -> Result<usize, StorageError> {
        self.count("SELECT COUNT(*) FROM subscribers WHERE is_active = 1")
    }

    fn count(&self, sql: &str) -> Result<usize, StorageError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
            Ok(n as usize)
        })
    }
}
