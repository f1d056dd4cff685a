// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod classify;
pub mod config;
pub mod cycle;
pub mod error;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod notifier;
pub mod scheduler;
pub mod service;
pub mod sources;
pub mod storage;
pub mod transport;

// ---- Re-exports for stable public API ----
pub use crate::api::create_router;
pub use crate::config::AppConfig;
pub use crate::error::{CycleError, ErrorKind, FailureKind, SourceError, StorageError};
pub use crate::model::{Category, CategoryFilter, CycleResult, Posting, RawCandidate, Subscriber};
pub use crate::service::{JobFeed, Stats};
