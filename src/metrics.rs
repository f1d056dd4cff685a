// src/metrics.rs

//! Prometheus recorder, series descriptions and the `/metrics` route.

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("cycle_runs_total", "Aggregation cycles completed.");
        describe_counter!(
            "cycle_new_postings_total",
            "Postings stored for the first time."
        );
        describe_counter!(
            "source_candidates_total",
            "Raw candidates returned per source."
        );
        describe_counter!(
            "source_errors_total",
            "Source fetch failures by source and error kind."
        );
        describe_counter!(
            "normalize_dropped_total",
            "Candidates dropped for a missing title or url."
        );
        describe_counter!(
            "delivery_failures_total",
            "Failed deliveries by failure kind."
        );
        describe_counter!(
            "cycle_storage_failures_total",
            "Scheduled cycles whose persistence step failed."
        );
        describe_counter!("deliveries_sent_total", "Deliveries handed to the transport successfully.");
        describe_counter!(
            "delivery_batches_dropped_total",
            "Delivery batches not queued, by reason."
        );
        describe_histogram!("source_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_histogram!("source_page_fetch_ms", "Single page fetch time in milliseconds.");
        describe_gauge!("cycle_last_run_ts", "Unix ts when the last cycle finished.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Call once per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// A handle that is not wired to the global recorder; renders empty.
    /// Lets tests build the router without fighting over the global.
    pub fn detached() -> Self {
        Self {
            handle: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
