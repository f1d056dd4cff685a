// src/config.rs

//! Process configuration.
//!
//! Precedence, lowest first: built-in defaults, TOML file, environment.
//! The TOML file is `$JOBFEED_CONFIG` when set, else `config/jobfeed.toml`
//! when present.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PATH: &str = "JOBFEED_CONFIG";
const DEFAULT_PATH: &str = "config/jobfeed.toml";

pub const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub cycle_interval_secs: u64,
    pub fetch_limit_per_source: usize,
    pub max_postings_per_delivery: usize,
    pub max_postings_per_group: usize,
    /// When set (non-zero), only this identity may trigger manual cycles.
    pub admin_identity: Option<i64>,
    pub group_chat_id: Option<i64>,
    pub jooble_api_key: Option<String>,
    pub db_path: PathBuf,
    pub request_timeout_secs: u64,
    pub source_timeout_secs: u64,
    pub user_agents: Vec<String>,
    pub http_addr: String,
    pub delivery_webhook_url: Option<String>,
    /// Optional replacement for the built-in category rule table.
    pub categories_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 60 * 60,
            fetch_limit_per_source: 25,
            max_postings_per_delivery: 5,
            max_postings_per_group: 10,
            admin_identity: None,
            group_chat_id: None,
            jooble_api_key: None,
            db_path: PathBuf::from("jobs.db"),
            request_timeout_secs: 15,
            source_timeout_secs: 60,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            http_addr: "0.0.0.0:8000".to_string(),
            delivery_webhook_url: None,
            categories_path: None,
        }
    }
}

impl AppConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs.max(1))
    }

    /// Load from an explicit TOML path, then apply environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $JOBFEED_CONFIG
    /// 2) config/jobfeed.toml
    /// 3) defaults
    ///
    /// Environment overrides are applied in every case.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        let mut cfg = AppConfig::default();
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Overlay recognised environment variables. `get` is injectable for tests.
    pub fn apply_env<F>(&mut self, get: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("CHECK_INTERVAL_MINUTES") {
            let mins: u64 = v.parse().context("CHECK_INTERVAL_MINUTES must be an integer")?;
            self.cycle_interval_secs = mins.max(1) * 60;
        }
        if let Some(v) = get("FETCH_LIMIT_PER_SOURCE") {
            self.fetch_limit_per_source = v.parse().context("FETCH_LIMIT_PER_SOURCE")?;
        }
        if let Some(v) = get("MAX_POSTINGS_PER_DELIVERY") {
            self.max_postings_per_delivery = v.parse().context("MAX_POSTINGS_PER_DELIVERY")?;
        }
        if let Some(v) = get("ADMIN_ID") {
            let id: i64 = v.parse().context("ADMIN_ID must be an integer")?;
            self.admin_identity = (id != 0).then_some(id);
        }
        if let Some(v) = get("GROUP_CHAT_ID") {
            self.group_chat_id = Some(v.parse().context("GROUP_CHAT_ID must be an integer")?);
        }
        if let Some(v) = get("JOOBLE_API_KEY") {
            self.jooble_api_key = Some(v);
        }
        if let Some(v) = get("DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = get("HTTP_ADDR") {
            self.http_addr = v;
        }
        if let Some(v) = get("DELIVERY_WEBHOOK_URL") {
            self.delivery_webhook_url = Some(v);
        }
        if let Some(v) = get("CATEGORIES_PATH") {
            self.categories_path = Some(PathBuf::from(v));
        }

        // A zero admin id in the file means "ungated", same as the env var.
        if self.admin_identity == Some(0) {
            self.admin_identity = None;
        }
        Ok(())
    }
}
