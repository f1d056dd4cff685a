// src/sources/mod.rs

//! Source adapters: one external job board each, behind one capability.
//!
//! An adapter only knows how to turn its pages into [`RawCandidate`]s. The
//! orchestrator never special-cases a source; it calls [`fetch_isolated`],
//! which gives the call a deadline and turns every failure into a
//! per-source [`ErrorKind`]. Multi-page adapters honor the deadline page by
//! page, so pages fetched before it still count.

pub mod catalog;
pub mod html;
pub mod http;
pub mod json_api;
pub mod rss;
pub mod structured;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tokio::time::Instant;

use crate::error::{ErrorKind, SourceError};
use crate::model::RawCandidate;

/// Parsing strategy of an adapter, for logs and metrics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Rss,
    JsonApi,
    StructuredHtml,
    Html,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Rss => "rss",
            Strategy::JsonApi => "json_api",
            Strategy::StructuredHtml => "structured_html",
            Strategy::Html => "html",
        })
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn strategy(&self) -> Strategy;

    /// Up to `limit` candidates, most recent first in source order.
    async fn fetch(&self, limit: usize) -> Result<Vec<RawCandidate>, SourceError>;

    /// Like [`fetch`](Self::fetch), but stops requesting pages at
    /// `deadline` and returns what it has by then.
    async fn fetch_until(&self, limit: usize, _deadline: Instant) -> Result<Vec<RawCandidate>, SourceError> {
        self.fetch(limit).await
    }
}

/// Time past the deadline an adapter gets to parse what it already fetched
/// before it is abandoned.
pub const DEADLINE_GRACE: Duration = Duration::from_secs(2);

/// What one adapter produced in a cycle.
#[derive(Debug, Clone)]
pub struct SourceFetch {
    pub source: String,
    pub candidates: Vec<RawCandidate>,
    pub error: Option<ErrorKind>,
}

/// Run one adapter against a deadline `timeout` from now. Never fails.
///
/// The adapter is abandoned outright only when it overruns the deadline by
/// more than [`DEADLINE_GRACE`].
pub async fn fetch_isolated(adapter: Arc<dyn SourceAdapter>, limit: usize, timeout: Duration) -> SourceFetch {
    let name = adapter.name().to_string();
    let t0 = Instant::now();
    let deadline = t0 + timeout;

    let outcome = match tokio::time::timeout_at(deadline + DEADLINE_GRACE, adapter.fetch_until(limit, deadline)).await {
        Ok(res) => res,
        Err(_) => Err(SourceError::unavailable(format!(
            "timed out after {}s",
            timeout.as_secs()
        ))),
    };

    histogram!("source_fetch_ms", "source" => name.clone()).record(t0.elapsed().as_secs_f64() * 1_000.0);

    match outcome {
        Ok(mut candidates) => {
            candidates.truncate(limit);
            counter!("source_candidates_total", "source" => name.clone()).increment(candidates.len() as u64);
            tracing::info!(
                target: "sources",
                source = %name,
                strategy = %adapter.strategy(),
                count = candidates.len(),
                "source fetched"
            );
            SourceFetch {
                source: name,
                candidates,
                error: None,
            }
        }
        Err(e) => {
            counter!("source_errors_total", "source" => name.clone(), "kind" => e.kind.as_str())
                .increment(1);
            tracing::warn!(
                target: "sources",
                source = %name,
                strategy = %adapter.strategy(),
                kind = %e.kind,
                error = %e.message,
                "source failed"
            );
            SourceFetch {
                source: name,
                candidates: Vec::new(),
                error: Some(e.kind),
            }
        }
    }
}

/// Merge per-page results of a multi-page source.
///
/// The source fails only when every page failed; the first error is
/// reported. Duplicates across pages (same native id, else same url) are
/// collapsed, keeping the first occurrence.
pub fn merge_pages(pages: Vec<Result<Vec<RawCandidate>, SourceError>>) -> Result<Vec<RawCandidate>, SourceError> {
    if pages.is_empty() {
        return Ok(Vec::new());
    }

    let mut first_err = None;
    let mut any_ok = false;
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for page in pages {
        match page {
            Ok(items) => {
                any_ok = true;
                for item in items {
                    let key = item
                        .native_id
                        .clone()
                        .or_else(|| item.url.clone())
                        .unwrap_or_default();
                    if key.is_empty() || seen.insert(key) {
                        out.push(item);
                    }
                }
            }
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }

    match (any_ok, first_err) {
        (false, Some(e)) => Err(e),
        _ => Ok(out),
    }
}

/// Resolve `href` against `base`; absolute links pass through unchanged.
pub fn resolve_link(base: Option<&url::Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Ok(abs) = url::Url::parse(href) {
        return Some(abs.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}
