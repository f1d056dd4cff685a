// src/cycle.rs

//! Aggregation cycle: fetch every source, normalize, dedup-store.
//!
//! Cycles never overlap. The scheduler waits for the guard; a manual
//! trigger that finds it taken is rejected with [`CycleError::InProgress`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use metrics::{counter, gauge};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{CycleError, ErrorKind};
use crate::metrics::ensure_metrics_described;
use crate::model::CycleResult;
use crate::normalize::Normalizer;
use crate::sources::{fetch_isolated, SourceAdapter, SourceFetch};
use crate::storage::PostingStore;

/// Proof that the caller holds the cycle guard. Whatever the holder does
/// after [`Orchestrator::run`] is still ordered against other cycles.
pub type CycleGuard<'a> = MutexGuard<'a, ()>;

pub struct Orchestrator {
    sources: Vec<Arc<dyn SourceAdapter>>,
    normalizer: Normalizer,
    store: PostingStore,
    fetch_limit: usize,
    source_timeout: Duration,
    guard: Mutex<()>,
}

impl Orchestrator {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        normalizer: Normalizer,
        store: PostingStore,
        fetch_limit: usize,
        source_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            normalizer,
            store,
            fetch_limit,
            source_timeout,
            guard: Mutex::new(()),
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// True while some cycle holds the guard.
    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    /// Wait for any running cycle, then take the guard.
    pub async fn lock(&self) -> CycleGuard<'_> {
        self.guard.lock().await
    }

    /// Take the guard now, or fail with `InProgress` if a cycle is running.
    pub fn try_lock(&self) -> Result<CycleGuard<'_>, CycleError> {
        self.guard.try_lock().map_err(|_| CycleError::InProgress)
    }

    /// Run one cycle, waiting for a running one to finish first.
    pub async fn run_cycle(&self) -> Result<CycleResult, CycleError> {
        let held = self.lock().await;
        self.run(&held).await
    }

    /// Run one cycle now, or fail with `InProgress` if one is running.
    pub async fn try_run_cycle(&self) -> Result<CycleResult, CycleError> {
        let held = self.try_lock()?;
        self.run(&held).await
    }

    /// One cycle under a guard the caller already holds.
    pub async fn run(&self, _held: &CycleGuard<'_>) -> Result<CycleResult, CycleError> {
        ensure_metrics_described();
        let started_at = Utc::now();
        tracing::info!(target: "cycle", sources = self.sources.len(), "cycle started");

        let fetches = self.fetch_all().await;

        let mut result = CycleResult {
            started_at: Some(started_at),
            ..CycleResult::default()
        };
        for f in &fetches {
            result.per_source_counts.insert(f.source.clone(), f.candidates.len());
            if let Some(kind) = f.error {
                result.per_source_errors.insert(f.source.clone(), kind);
            }
        }

        let batch = fetches
            .iter()
            .flat_map(|f| f.candidates.iter().map(move |c| (f.source.as_str(), c)));
        let (postings, dropped) = self.normalizer.normalize_all(batch, started_at);
        result.dropped = dropped;
        counter!("normalize_dropped_total").increment(dropped as u64);

        let fresh = match self.store.store_new(&postings) {
            Ok(fresh) => fresh,
            Err(e) => {
                tracing::error!(target: "cycle", error = %e, normalized = postings.len(), "persisting postings failed");
                return Err(e.into());
            }
        };

        let finished_at = Utc::now();
        counter!("cycle_runs_total").increment(1);
        counter!("cycle_new_postings_total").increment(fresh.len() as u64);
        gauge!("cycle_last_run_ts").set(finished_at.timestamp() as f64);

        tracing::info!(
            target: "cycle",
            normalized = postings.len(),
            dropped = dropped,
            new = fresh.len(),
            failed_sources = result.per_source_errors.len(),
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "cycle finished"
        );

        result.new_postings = fresh;
        result.finished_at = Some(finished_at);
        Ok(result)
    }

    /// Every adapter in its own task; results in catalogue order.
    async fn fetch_all(&self) -> Vec<SourceFetch> {
        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|src| {
                let name = src.name().to_string();
                let task = tokio::spawn(fetch_isolated(src.clone(), self.fetch_limit, self.source_timeout));
                (name, task)
            })
            .collect();

        let (names, tasks): (Vec<String>, Vec<_>) = handles.into_iter().unzip();
        join_all(tasks)
            .await
            .into_iter()
            .zip(names)
            .map(|(joined, source)| match joined {
                Ok(fetch) => fetch,
                Err(e) => {
                    // A panicking adapter costs only its own source.
                    tracing::error!(target: "cycle", source = %source, error = %e, "source task aborted");
                    counter!("source_errors_total", "source" => source.clone(), "kind" => ErrorKind::SourceUnavailable.as_str())
                        .increment(1);
                    SourceFetch {
                        source,
                        candidates: Vec::new(),
                        error: Some(ErrorKind::SourceUnavailable),
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::model::RawCandidate;
    use crate::sources::Strategy;
    use crate::storage::Db;
    use async_trait::async_trait;

    struct Fixed(&'static str, Vec<RawCandidate>);

    #[async_trait]
    impl SourceAdapter for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn strategy(&self) -> Strategy {
            Strategy::JsonApi
        }
        async fn fetch(&self, _limit: usize) -> Result<Vec<RawCandidate>, SourceError> {
            Ok(self.1.clone())
        }
    }

    struct Gate(Arc<tokio::sync::Notify>);

    #[async_trait]
    impl SourceAdapter for Gate {
        fn name(&self) -> &str {
            "Gate"
        }
        fn strategy(&self) -> Strategy {
            Strategy::Html
        }
        async fn fetch(&self, _limit: usize) -> Result<Vec<RawCandidate>, SourceError> {
            self.0.notified().await;
            Ok(Vec::new())
        }
    }

    struct Panics;

    #[async_trait]
    impl SourceAdapter for Panics {
        fn name(&self) -> &str {
            "Panics"
        }
        fn strategy(&self) -> Strategy {
            Strategy::Html
        }
        async fn fetch(&self, _limit: usize) -> Result<Vec<RawCandidate>, SourceError> {
            panic!("adapter bug")
        }
    }

    fn cand(id: &str) -> RawCandidate {
        RawCandidate {
            native_id: Some(id.into()),
            title: Some(format!("Customer Service {id}")),
            url: Some(format!("https://jobs.test/{id}")),
            ..RawCandidate::default()
        }
    }

    fn orchestrator(sources: Vec<Arc<dyn SourceAdapter>>) -> Orchestrator {
        let store = PostingStore::new(Db::open_in_memory().unwrap());
        Orchestrator::new(sources, Normalizer::default(), store, 25, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn second_cycle_finds_nothing_new() {
        let orch = orchestrator(vec![Arc::new(Fixed("A", vec![cand("1"), cand("2")]))]);
        let first = orch.run_cycle().await.unwrap();
        assert_eq!(first.new_postings.len(), 2);
        let second = orch.run_cycle().await.unwrap();
        assert!(second.new_postings.is_empty());
        assert_eq!(second.per_source_counts.get("A"), Some(&2));
    }

    #[tokio::test]
    async fn drops_are_counted() {
        let mut bad = cand("3");
        bad.url = None;
        let orch = orchestrator(vec![Arc::new(Fixed("A", vec![cand("1"), bad]))]);
        let res = orch.run_cycle().await.unwrap();
        assert_eq!(res.dropped, 1);
        assert_eq!(res.new_postings.len(), 1);
    }

    #[tokio::test]
    async fn panicking_adapter_is_isolated() {
        let orch = orchestrator(vec![Arc::new(Panics), Arc::new(Fixed("A", vec![cand("1")]))]);
        let res = orch.run_cycle().await.unwrap();
        assert_eq!(res.per_source_errors.get("Panics"), Some(&ErrorKind::SourceUnavailable));
        assert_eq!(res.new_postings.len(), 1);
    }

    #[tokio::test]
    async fn manual_trigger_rejected_while_cycle_in_flight() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let orch = Arc::new(orchestrator(vec![Arc::new(Gate(gate.clone()))]));

        let running = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.run_cycle().await })
        };
        while !orch.is_running() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(orch.try_run_cycle().await, Err(CycleError::InProgress)));

        gate.notify_one();
        running.await.unwrap().unwrap();
        assert!(!orch.is_running());
    }
}
