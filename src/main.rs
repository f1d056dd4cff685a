// src/main.rs

//! jobfeed: binary entrypoint.
//! Loads config, opens the store, starts the cycle timer and the delivery
//! worker, then serves the operator HTTP surface.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobfeed::metrics::Metrics;
use jobfeed::scheduler::spawn_cycle_scheduler;
use jobfeed::transport::{spawn_delivery_worker, DeliveryTransport, LogTransport, WebhookTransport};
use jobfeed::{create_router, AppConfig, JobFeed};

/// `RUST_LOG` wins; otherwise `jobfeed=info,warn`. `LOG_FORMAT=json` for
/// machine-readable output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobfeed=info,warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    let metrics = Metrics::init()?;

    let (feed, deliveries_rx) = JobFeed::from_config(cfg.clone())?;
    let feed = Arc::new(feed);
    tracing::info!(
        sources = ?feed.source_names(),
        interval_secs = cfg.cycle_interval().as_secs(),
        admin_gated = cfg.admin_identity.is_some(),
        group = cfg.group_chat_id.is_some(),
        "jobfeed starting"
    );

    let transport: Arc<dyn DeliveryTransport> = match cfg.delivery_webhook_url.clone() {
        Some(url) => Arc::new(WebhookTransport::new(url).with_timeout(cfg.request_timeout_secs)),
        None => {
            tracing::info!("no delivery webhook configured, deliveries are logged only");
            Arc::new(LogTransport)
        }
    };
    let _worker = spawn_delivery_worker(deliveries_rx, transport, feed.notifier());
    let _timer = spawn_cycle_scheduler(feed.clone(), cfg.cycle_interval());

    let app = create_router(feed, &metrics);
    let listener = tokio::net::TcpListener::bind(&cfg.http_addr)
        .await
        .with_context(|| format!("binding {}", cfg.http_addr))?;
    tracing::info!(addr = %cfg.http_addr, "operator api listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
