// src/scheduler.rs

//! Recurring cycle timer.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::CycleError;
use crate::service::JobFeed;

/// Spawn the recurring cycle timer. The first cycle runs immediately.
///
/// A tick that lands while a manual cycle holds the guard waits for it;
/// ticks missed meanwhile are not replayed.
pub fn spawn_cycle_scheduler(feed: Arc<JobFeed>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match feed.run_cycle().await {
                Ok(res) => {
                    tracing::info!(target: "cycle", summary = %res.summary(), "scheduled cycle tick");
                }
                Err(CycleError::Storage(e)) => {
                    counter!("cycle_storage_failures_total").increment(1);
                    tracing::error!(target: "cycle", error = %e, "scheduled cycle could not persist");
                }
                Err(e) => {
                    tracing::warn!(target: "cycle", error = %e, "scheduled cycle skipped");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::config::AppConfig;
    use crate::error::SourceError;
    use crate::model::RawCandidate;
    use crate::sources::{SourceAdapter, Strategy};
    use crate::storage::Db;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl SourceAdapter for Counting {
        fn name(&self) -> &str {
            "Counting"
        }
        fn strategy(&self) -> Strategy {
            Strategy::JsonApi
        }
        async fn fetch(&self, _limit: usize) -> Result<Vec<RawCandidate>, SourceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (feed, _rx) = JobFeed::new(
            AppConfig::default(),
            Db::open_in_memory().unwrap(),
            vec![Arc::new(Counting(calls.clone()))],
            Classifier::builtin(),
        );
        let handle = spawn_cycle_scheduler(Arc::new(feed), Duration::from_secs(60));

        // Startup tick.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        handle.abort();
    }
}
