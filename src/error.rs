// src/error.rs

//! Error taxonomy for the aggregation core.
//!
//! Source failures are values, not faults: adapters hand a [`SourceError`]
//! back to the orchestrator, which records its [`ErrorKind`] per source and
//! carries on. Only [`StorageError`] aborts the persistence step of a cycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-source failure tag recorded in a cycle result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network error, timeout, or a non-success status that is not a block.
    SourceUnavailable,
    /// The body did not have the expected shape.
    SourceParseError,
    /// Anti-scraping / rate-limit response (403, 429, 999).
    SourceBlocked,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::SourceParseError => "source_parse_error",
            ErrorKind::SourceBlocked => "source_blocked",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a single source fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct SourceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn unavailable(message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::SourceUnavailable,
            message: message.to_string(),
        }
    }

    pub fn parse(message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::SourceParseError,
            message: message.to_string(),
        }
    }

    pub fn blocked(message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::SourceBlocked,
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        // Request urls may embed API keys.
        let e = e.without_url();
        if e.is_decode() {
            Self::parse(e)
        } else {
            Self::unavailable(e)
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(e)
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(e: quick_xml::Error) -> Self {
        Self::parse(e)
    }
}

/// Persistence layer failure.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Reasons a cycle did not produce a result.
#[derive(Error, Debug)]
pub enum CycleError {
    /// Another cycle holds the guard; manual triggers are rejected.
    #[error("a cycle is already in progress")]
    InProgress,

    #[error("identity {0} is not allowed to trigger a cycle")]
    Unauthorized(i64),

    #[error("persisting postings failed: {0}")]
    Storage(#[from] StorageError),
}

/// How the transport classified a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The chat can never be reached again (blocked the bot, deleted account).
    PermanentlyBlocked,
    /// Worth retrying later; the core does not act on it.
    Transient,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PermanentlyBlocked => "permanently_blocked",
            FailureKind::Transient => "transient",
        }
    }
}

/// Error returned by a delivery transport.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("permanent delivery failure: {0}")]
    Permanent(String),

    #[error("transient delivery failure: {0}")]
    Transient(String),
}

impl DeliveryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DeliveryError::Permanent(_) => FailureKind::PermanentlyBlocked,
            DeliveryError::Transient(_) => FailureKind::Transient,
        }
    }
}
