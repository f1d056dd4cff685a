// src/service.rs

//! The context object. Built once at startup from config and a storage
//! handle, then shared (behind an `Arc`) with the scheduler, the delivery
//! worker and the HTTP surface.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use anyhow::Context;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::classify::Classifier;
use crate::config::AppConfig;
use crate::cycle::Orchestrator;
use crate::error::{CycleError, ErrorKind, FailureKind, StorageError};
use crate::model::{CategoryFilter, ChatId, CycleResult, Posting, Subscriber};
use crate::normalize::Normalizer;
use crate::notifier::{DeliveryBatch, GroupBroadcast, Notifier};
use crate::sources::catalog::default_catalog;
use crate::sources::http::HttpFetcher;
use crate::sources::SourceAdapter;
use crate::storage::{Db, PostingStore, SubscriberRegistry};

/// Capacity of the deliveries queue between cycles and the worker.
pub const DELIVERY_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Default)]
struct LastCycle {
    per_source_counts: BTreeMap<String, usize>,
    per_source_errors: BTreeMap<String, ErrorKind>,
    finished_at: Option<DateTime<Utc>>,
}

/// Snapshot for the stats command.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_postings: usize,
    pub total_active_subscribers: usize,
    /// Candidates per source in the last cycle.
    pub per_source_counts: BTreeMap<String, usize>,
    pub last_cycle_errors: BTreeMap<String, ErrorKind>,
    pub total_subscribers: usize,
    /// Postings first seen on the current UTC day.
    pub postings_today: usize,
    pub stored_per_source: BTreeMap<String, usize>,
    pub last_cycle_finished_at: Option<DateTime<Utc>>,
    pub cycle_running: bool,
}

pub struct JobFeed {
    cfg: AppConfig,
    orchestrator: Orchestrator,
    postings: PostingStore,
    registry: SubscriberRegistry,
    notifier: Notifier,
    deliveries: mpsc::Sender<DeliveryBatch>,
    last_cycle: RwLock<LastCycle>,
}

impl JobFeed {
    /// Wire every component over `db` with the given sources. The receiver
    /// is the `deliveries_ready` queue for the transport worker.
    pub fn new(
        cfg: AppConfig,
        db: Db,
        sources: Vec<Arc<dyn SourceAdapter>>,
        classifier: Classifier,
    ) -> (Self, mpsc::Receiver<DeliveryBatch>) {
        let postings = PostingStore::new(db.clone());
        let registry = SubscriberRegistry::new(db);
        let group = cfg.group_chat_id.map(|chat_id| GroupBroadcast {
            chat_id,
            max_postings: cfg.max_postings_per_group,
        });
        let notifier = Notifier::new(registry.clone(), cfg.max_postings_per_delivery, group);
        let orchestrator = Orchestrator::new(
            sources,
            Normalizer::new(classifier),
            postings.clone(),
            cfg.fetch_limit_per_source,
            cfg.source_timeout(),
        );
        let (tx, rx) = mpsc::channel(DELIVERY_QUEUE_CAPACITY);

        let feed = Self {
            cfg,
            orchestrator,
            postings,
            registry,
            notifier,
            deliveries: tx,
            last_cycle: RwLock::new(LastCycle::default()),
        };
        (feed, rx)
    }

    /// Production wiring: opens the database and builds the default
    /// catalogue and the category rules from `cfg`.
    pub fn from_config(cfg: AppConfig) -> anyhow::Result<(Self, mpsc::Receiver<DeliveryBatch>)> {
        let db = Db::open(&cfg.db_path).with_context(|| format!("opening database {}", cfg.db_path.display()))?;
        let classifier = Classifier::from_optional_path(cfg.categories_path.as_deref())?;
        let fetcher = Arc::new(HttpFetcher::from_config(&cfg).context("building http client")?);
        let sources = default_catalog(&cfg, fetcher)?;
        Ok(Self::new(cfg, db, sources, classifier))
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    /// Handle for the delivery worker.
    pub fn notifier(&self) -> Notifier {
        self.notifier.clone()
    }

    pub fn source_names(&self) -> Vec<String> {
        self.orchestrator.source_names()
    }

    pub fn is_cycle_running(&self) -> bool {
        self.orchestrator.is_running()
    }

    /// One aggregation pass. Waits for an in-flight cycle to finish first.
    pub async fn run_cycle(&self) -> Result<CycleResult, CycleError> {
        let held = self.orchestrator.lock().await;
        let result = self.orchestrator.run(&held).await?;
        self.after_cycle(&result);
        Ok(result)
    }

    /// Admin-invoked cycle. Rejected while another cycle is in flight.
    pub async fn trigger_manual(&self, identity: Option<i64>) -> Result<CycleResult, CycleError> {
        if let Some(admin) = self.cfg.admin_identity {
            if identity != Some(admin) {
                tracing::warn!(target: "cycle", identity = ?identity, "manual cycle refused");
                return Err(CycleError::Unauthorized(identity.unwrap_or_default()));
            }
        }
        let held = self.orchestrator.try_lock()?;
        let result = self.orchestrator.run(&held).await?;
        tracing::info!(target: "cycle", summary = %result.summary(), "manual cycle done");
        self.after_cycle(&result);
        Ok(result)
    }

    /// Record the result and queue deliveries. Called with the cycle guard
    /// held, so stats and batches follow cycle order. Nothing here fails the
    /// cycle: its postings are already stored.
    fn after_cycle(&self, result: &CycleResult) {
        match self.last_cycle.write() {
            Ok(mut last) => {
                *last = LastCycle {
                    per_source_counts: result.per_source_counts.clone(),
                    per_source_errors: result.per_source_errors.clone(),
                    finished_at: result.finished_at,
                };
            }
            Err(_) => tracing::error!(target: "cycle", "last-cycle lock poisoned"),
        }

        let deliveries = match self.notifier.build_deliveries(&result.new_postings) {
            Ok(d) => d,
            Err(e) => {
                tracing::error!(target: "notify", error = %e, "building deliveries failed");
                return;
            }
        };
        if deliveries.is_empty() {
            return;
        }

        let batch = DeliveryBatch {
            cycle_finished_at: result.finished_at.unwrap_or_else(Utc::now),
            deliveries: deliveries.into_values().collect(),
        };
        // Never awaits: the caller may be an HTTP request that goes away.
        match self.deliveries.try_send(batch) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(batch)) => {
                counter!("delivery_batches_dropped_total", "reason" => "queue_full").increment(1);
                tracing::warn!(
                    target: "notify",
                    deliveries = batch.deliveries.len(),
                    capacity = DELIVERY_QUEUE_CAPACITY,
                    "delivery queue full; batch discarded"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                counter!("delivery_batches_dropped_total", "reason" => "no_worker").increment(1);
                tracing::warn!(target: "notify", "no delivery worker; batch discarded");
            }
        }
    }

    /// Most recently discovered first.
    pub fn get_latest(&self, n: usize, filter: CategoryFilter) -> Result<Vec<Posting>, StorageError> {
        self.postings.get_latest(n, filter)
    }

    pub fn subscribe(&self, chat_id: ChatId, name: Option<&str>) -> Result<Subscriber, StorageError> {
        let sub = self.registry.subscribe(chat_id, name, Utc::now())?;
        tracing::info!(target: "notify", chat_id, filter = sub.category_filter.as_str(), "subscribed");
        Ok(sub)
    }

    pub fn unsubscribe(&self, chat_id: ChatId) -> Result<bool, StorageError> {
        let known = self.registry.unsubscribe(chat_id)?;
        tracing::info!(target: "notify", chat_id, known, "unsubscribed");
        Ok(known)
    }

    pub fn set_filter(&self, chat_id: ChatId, filter: CategoryFilter) -> Result<bool, StorageError> {
        self.registry.set_filter(chat_id, filter)
    }

    pub fn get_subscription(&self, chat_id: ChatId) -> Result<Option<Subscriber>, StorageError> {
        self.registry.get(chat_id)
    }

    pub fn report_delivery_failure(&self, chat_id: ChatId, kind: FailureKind) -> Result<(), StorageError> {
        self.notifier.report_delivery_failure(chat_id, kind)
    }

    pub fn get_stats(&self) -> Result<Stats, StorageError> {
        let last = self
            .last_cycle
            .read()
            .map(|l| l.clone())
            .map_err(|_| StorageError::Poisoned)?;
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|d| d.and_utc())
            .unwrap_or_else(Utc::now);

        Ok(Stats {
            total_postings: self.postings.count()?,
            total_active_subscribers: self.registry.count_active()?,
            per_source_counts: last.per_source_counts,
            last_cycle_errors: last.per_source_errors,
            total_subscribers: self.registry.count_all()?,
            postings_today: self.postings.count_since(midnight)?,
            stored_per_source: self.postings.count_by_source()?,
            last_cycle_finished_at: last.finished_at,
            cycle_running: self.orchestrator.is_running(),
        })
    }
}
