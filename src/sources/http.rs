// src/sources/http.rs

//! Page retrieval shared by every strategy: a rotating-UA HTTP fetcher for
//! production, canned bodies for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::histogram;
use reqwest::{header, Client, StatusCode};
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::error::SourceError;

/// Shared client. The User-Agent rotates on every request.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    user_agents: Vec<String>,
    next_ua: AtomicUsize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agents: Vec<String>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;
        let user_agents = if user_agents.is_empty() {
            vec![format!("jobfeed/{}", env!("CARGO_PKG_VERSION"))]
        } else {
            user_agents
        };
        Ok(Self {
            client,
            user_agents,
            next_ua: AtomicUsize::new(0),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, SourceError> {
        Self::new(cfg.request_timeout(), cfg.user_agents.clone())
    }

    fn user_agent(&self) -> &str {
        let i = self.next_ua.fetch_add(1, Ordering::Relaxed);
        &self.user_agents[i % self.user_agents.len()]
    }

    pub async fn fetch(&self, req: &PageRequest) -> Result<String, SourceError> {
        let t0 = std::time::Instant::now();
        let builder = match req {
            PageRequest::Get { url, accept } => self
                .client
                .get(url)
                .header(header::ACCEPT, accept.unwrap_or(ACCEPT_HTML)),
            PageRequest::PostJson { url, body } => self
                .client
                .post(url)
                .header(header::ACCEPT, "application/json")
                .json(body),
        };
        let resp = builder
            .header(header::USER_AGENT, self.user_agent())
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        check_status(resp.status(), req.url())?;
        let body = resp.text().await?;

        histogram!("source_page_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(body)
    }
}

pub const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
pub const ACCEPT_XML: &str = "application/rss+xml, application/xml";
pub const ACCEPT_JSON: &str = "application/json";

/// Host part only; some API urls carry credentials in the path.
pub fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "<invalid url>".to_string())
}

/// Map anti-bot statuses to `SourceBlocked`, any other failure to `SourceUnavailable`.
pub fn check_status(status: StatusCode, url: &str) -> Result<(), SourceError> {
    match status.as_u16() {
        403 | 429 | 999 => Err(SourceError::blocked(format!(
            "HTTP {} from {}",
            status.as_u16(),
            host_of(url)
        ))),
        _ if status.is_success() => Ok(()),
        code => Err(SourceError::unavailable(format!("HTTP {code} from {}", host_of(url)))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageRequest {
    Get {
        url: String,
        accept: Option<&'static str>,
    },
    PostJson {
        url: String,
        body: serde_json::Value,
    },
}

impl PageRequest {
    pub fn get(url: impl Into<String>) -> Self {
        PageRequest::Get {
            url: url.into(),
            accept: None,
        }
    }

    pub fn get_accepting(url: impl Into<String>, accept: &'static str) -> Self {
        PageRequest::Get {
            url: url.into(),
            accept: Some(accept),
        }
    }

    pub fn url(&self) -> &str {
        match self {
            PageRequest::Get { url, .. } | PageRequest::PostJson { url, .. } => url,
        }
    }
}

/// Where an adapter's page bodies come from.
#[derive(Debug, Clone)]
pub enum PageSource {
    Http {
        fetcher: Arc<HttpFetcher>,
        requests: Vec<PageRequest>,
        /// Pause between consecutive pages of the same source.
        delay: Duration,
    },
    /// Canned bodies, used by tests and offline runs.
    Fixture(Vec<String>),
}

impl PageSource {
    pub fn http(fetcher: Arc<HttpFetcher>, requests: Vec<PageRequest>, delay: Duration) -> Self {
        PageSource::Http {
            fetcher,
            requests,
            delay,
        }
    }

    /// Fetch each page in order. Every page gets its own result.
    ///
    /// With a deadline, a page still in flight when it passes is cut off and
    /// later pages are not requested; pages already fetched are kept.
    pub async fn pages(&self, deadline: Option<Instant>) -> Vec<Result<String, SourceError>> {
        match self {
            PageSource::Fixture(bodies) => bodies.iter().cloned().map(Ok).collect(),
            PageSource::Http {
                fetcher,
                requests,
                delay,
            } => {
                let mut out = Vec::with_capacity(requests.len());
                for (i, req) in requests.iter().enumerate() {
                    if i > 0 && !delay.is_zero() {
                        let wake = Instant::now() + *delay;
                        tokio::time::sleep_until(deadline.map_or(wake, |d| wake.min(d))).await;
                    }
                    let res = match deadline {
                        Some(d) if Instant::now() >= d => Err(SourceError::unavailable(format!(
                            "source deadline passed before requesting {}",
                            host_of(req.url())
                        ))),
                        Some(d) => tokio::time::timeout_at(d, fetcher.fetch(req)).await.unwrap_or_else(|_| {
                            Err(SourceError::unavailable(format!(
                                "page from {} cut off at source deadline",
                                host_of(req.url())
                            )))
                        }),
                        None => fetcher.fetch(req).await,
                    };
                    if let Err(e) = &res {
                        tracing::debug!(target: "sources", host = %host_of(req.url()), error = %e, "page fetch failed");
                    }
                    out.push(res);
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn block_statuses_map_to_blocked() {
        for code in [403u16, 429, 999] {
            let st = StatusCode::from_u16(code).unwrap();
            assert_eq!(check_status(st, "u").unwrap_err().kind, ErrorKind::SourceBlocked);
        }
    }

    #[test]
    fn other_failures_map_to_unavailable() {
        let err = check_status(StatusCode::BAD_GATEWAY, "u").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceUnavailable);
        assert!(check_status(StatusCode::OK, "u").is_ok());
    }

    #[tokio::test]
    async fn fixture_pages_are_returned_in_order() {
        let src = PageSource::Fixture(vec!["a".into(), "b".into()]);
        let pages: Vec<String> = src.pages(None).await.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(pages, vec!["a", "b"]);
    }

    #[test]
    fn error_messages_carry_host_only() {
        let err = check_status(StatusCode::FORBIDDEN, "https://jooble.org/api/s3cr3t").unwrap_err();
        assert!(err.message.contains("jooble.org"));
        assert!(!err.message.contains("s3cr3t"));
    }

    #[test]
    fn user_agent_rotates() {
        let f = HttpFetcher::new(Duration::from_secs(1), vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(f.user_agent(), "a");
        assert_eq!(f.user_agent(), "b");
        assert_eq!(f.user_agent(), "a");
    }
}
