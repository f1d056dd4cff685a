// src/storage/postings.rs

//! Dedup & store: the only writer of the `postings` table.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{from_ms, to_ms, Db};
use crate::error::StorageError;
use crate::model::{Category, CategoryFilter, Posting};

const COLUMNS: &str = "fingerprint, title, company, location, salary_range, category, source_name, url, \
                       posted_at_ms, first_seen_at_ms";

/// Most recently discovered first; within one cycle, later inserts first.
const RECENT_FIRST: &str = "ORDER BY first_seen_at_ms DESC, posted_at_ms DESC, rowid DESC";

struct PostingRow {
    fingerprint: String,
    title: String,
    company: String,
    location: String,
    salary_range: Option<String>,
    category: String,
    source_name: String,
    url: String,
    posted_at_ms: Option<i64>,
    first_seen_at_ms: i64,
}

impl PostingRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            fingerprint: row.get(0)?,
            title: row.get(1)?,
            company: row.get(2)?,
            location: row.get(3)?,
            salary_range: row.get(4)?,
            category: row.get(5)?,
            source_name: row.get(6)?,
            url: row.get(7)?,
            posted_at_ms: row.get(8)?,
            first_seen_at_ms: row.get(9)?,
        })
    }
}

impl TryFrom<PostingRow> for Posting {
    type Error = StorageError;

    fn try_from(r: PostingRow) -> Result<Self, Self::Error> {
        let category: Category = r
            .category
            .parse()
            .map_err(|e| StorageError::Corrupt(format!("posting {}: {e}", r.fingerprint)))?;
        Ok(Posting {
            category,
            posted_at: r.posted_at_ms.map(from_ms).transpose()?,
            first_seen_at: from_ms(r.first_seen_at_ms)?,
            fingerprint: r.fingerprint,
            title: r.title,
            company: r.company,
            location: r.location,
            salary_range: r.salary_range,
            source_name: r.source_name,
            url: r.url,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PostingStore {
    db: Db,
}

impl PostingStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Persist the postings whose fingerprint was never seen and return
    /// exactly those, in input order.
    ///
    /// Runs in one transaction. Duplicates inside `postings` collapse onto
    /// the first occurrence; stored rows are never updated. On error nothing
    /// from this call is visible.
    pub fn store_new(&self, postings: &[Posting]) -> Result<Vec<Posting>, StorageError> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut fresh = Vec::new();
            {
                let mut insert = tx.prepare_cached(&format!(
                    "INSERT INTO postings ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                     ON CONFLICT(fingerprint) DO NOTHING"
                ))?;
                for p in postings {
                    let changed = insert.execute(params![
                        p.fingerprint,
                        p.title,
                        p.company,
                        p.location,
                        p.salary_range,
                        p.category.slug(),
                        p.source_name,
                        p.url,
                        p.posted_at.map(to_ms),
                        to_ms(p.first_seen_at),
                    ])?;
                    if changed == 1 {
                        fresh.push(p.clone());
                    }
                }
            }
            tx.commit()?;
            Ok(fresh)
        })
    }

    /// Up to `n` postings, most recent first, optionally one category only.
    pub fn get_latest(&self, n: usize, filter: CategoryFilter) -> Result<Vec<Posting>, StorageError> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let rows: Vec<PostingRow> = match filter {
                CategoryFilter::All => {
                    let mut stmt = conn.prepare_cached(&format!("SELECT {COLUMNS} FROM postings {RECENT_FIRST} LIMIT ?1"))?;
                    let rows = stmt.query_map(params![limit], PostingRow::read)?;
                    rows.collect::<Result<_, _>>()?
                }
                CategoryFilter::Only(c) => {
                    let mut stmt = conn.prepare_cached(&format!(
                        "SELECT {COLUMNS} FROM postings WHERE category = ?1 {RECENT_FIRST} LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![c.slug(), limit], PostingRow::read)?;
                    rows.collect::<Result<_, _>>()?
                }
            };
            rows.into_iter().map(Posting::try_from).collect()
        })
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM postings", [], |r| r.get(0))?;
            Ok(n as usize)
        })
    }

    /// Stored postings first seen at or after `since`.
    pub fn count_since(&self, since: DateTime<Utc>) -> Result<usize, StorageError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM postings WHERE first_seen_at_ms >= ?1",
                params![to_ms(since)],
                |r| r.get(0),
            )?;
            Ok(n as usize)
        })
    }

    pub fn count_by_source(&self) -> Result<BTreeMap<String, usize>, StorageError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached("SELECT source_name, COUNT(*) FROM postings GROUP BY source_name")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as usize)))?;
            Ok(rows.collect::<Result<_, _>>()?)
        })
    }
}
