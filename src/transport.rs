// src/transport.rs

//! Outbound delivery: a worker drains the deliveries queue and hands each
//! chat's list to a [`DeliveryTransport`], one chat at a time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::DeliveryError;
use crate::notifier::{Delivery, DeliveryBatch, Notifier};

#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, delivery: &Delivery) -> Result<(), DeliveryError>;
}

/// Logs what would be sent. Default when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogTransport;

#[async_trait]
impl DeliveryTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        tracing::info!(
            target: "notify",
            chat_id = delivery.chat_id,
            postings = delivery.postings.len(),
            remaining = delivery.remaining,
            group = delivery.group,
            "delivery (log transport)"
        );
        Ok(())
    }
}

/// Decide whether a failed webhook call is worth retrying.
///
/// 403/410, or a body saying the chat blocked us or was deactivated, is
/// permanent. Everything else is transient.
pub fn classify_failure(status: Option<StatusCode>, body: &str) -> DeliveryError {
    let lower = body.to_ascii_lowercase();
    let permanent = matches!(status, Some(StatusCode::FORBIDDEN) | Some(StatusCode::GONE))
        || lower.contains("blocked")
        || lower.contains("deactivated");
    let what = match status {
        Some(s) => format!("HTTP {}: {}", s.as_u16(), body.chars().take(200).collect::<String>()),
        None => body.to_string(),
    };
    if permanent {
        DeliveryError::Permanent(what)
    } else {
        DeliveryError::Transient(what)
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    chat_id: i64,
    group: bool,
    remaining: usize,
    postings: &'a [crate::model::Posting],
}

/// POSTs each delivery as JSON to a relay that owns the chat transport.
#[derive(Clone)]
pub struct WebhookTransport {
    url: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl WebhookTransport {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }
}

#[async_trait]
impl DeliveryTransport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            chat_id: delivery.chat_id,
            group: delivery.group,
            remaining: delivery.remaining,
            postings: &delivery.postings,
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) => {
                    let status = rsp.status();
                    let body = rsp.text().await.unwrap_or_default();
                    classify_failure(Some(status), &body)
                }
                Err(e) => classify_failure(None, &e.without_url().to_string()),
            };

            if matches!(err, DeliveryError::Permanent(_)) || attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

/// Drain `rx` until every sender is gone. Failures are reported back to
/// the notifier per chat and never stop the worker.
pub fn spawn_delivery_worker(
    mut rx: mpsc::Receiver<DeliveryBatch>,
    transport: Arc<dyn DeliveryTransport>,
    notifier: Notifier,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            let mut sent = 0usize;
            for delivery in &batch.deliveries {
                match transport.send(delivery).await {
                    Ok(()) => {
                        sent += 1;
                        counter!("deliveries_sent_total").increment(1);
                    }
                    Err(e) => {
                        let kind = e.kind();
                        tracing::warn!(
                            target: "notify",
                            chat_id = delivery.chat_id,
                            transport = transport.name(),
                            kind = kind.as_str(),
                            error = %e,
                            "delivery failed"
                        );
                        if delivery.group {
                            // Not a subscriber record; nothing to deactivate.
                            counter!("delivery_failures_total", "kind" => kind.as_str()).increment(1);
                        } else if let Err(se) = notifier.report_delivery_failure(delivery.chat_id, kind) {
                            tracing::error!(target: "notify", chat_id = delivery.chat_id, error = %se, "could not record delivery failure");
                        }
                    }
                }
            }
            tracing::info!(
                target: "notify",
                sent,
                total = batch.deliveries.len(),
                cycle_finished_at = %batch.cycle_finished_at,
                "delivery batch done"
            );
        }
        tracing::debug!(target: "notify", "delivery queue closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Posting};
    use crate::storage::{Db, SubscriberRegistry};
    use chrono::Utc;
    use std::sync::Mutex;

    #[test]
    fn forbidden_and_gone_are_permanent() {
        assert!(matches!(
            classify_failure(Some(StatusCode::FORBIDDEN), ""),
            DeliveryError::Permanent(_)
        ));
        assert!(matches!(
            classify_failure(Some(StatusCode::GONE), ""),
            DeliveryError::Permanent(_)
        ));
        assert!(matches!(
            classify_failure(Some(StatusCode::BAD_REQUEST), "Forbidden: bot was blocked by the user"),
            DeliveryError::Permanent(_)
        ));
        assert!(matches!(
            classify_failure(Some(StatusCode::TOO_MANY_REQUESTS), "retry later"),
            DeliveryError::Transient(_)
        ));
        assert!(matches!(classify_failure(None, "connection reset"), DeliveryError::Transient(_)));
    }

    /// Records chats; fails permanently for one of them.
    struct Recording {
        seen: Mutex<Vec<i64>>,
        blocked: i64,
    }

    #[async_trait]
    impl DeliveryTransport for Recording {
        fn name(&self) -> &str {
            "recording"
        }
        async fn send(&self, delivery: &Delivery) -> Result<(), DeliveryError> {
            self.seen.lock().unwrap().push(delivery.chat_id);
            if delivery.chat_id == self.blocked {
                return Err(DeliveryError::Permanent("bot was blocked by the user".into()));
            }
            Ok(())
        }
    }

    fn delivery(chat_id: i64) -> Delivery {
        Delivery {
            chat_id,
            postings: vec![Posting {
                fingerprint: "S:1".into(),
                title: "Chat Support".into(),
                company: "Acme".into(),
                location: "Manila".into(),
                salary_range: None,
                category: Category::CallCenter,
                source_name: "S".into(),
                url: "https://jobs.test/1".into(),
                posted_at: None,
                first_seen_at: Utc::now(),
            }],
            remaining: 0,
            group: false,
        }
    }

    #[tokio::test]
    async fn worker_sends_all_and_deactivates_blocked_chat() {
        let registry = SubscriberRegistry::new(Db::open_in_memory().unwrap());
        registry.subscribe(1, None, Utc::now()).unwrap();
        registry.subscribe(2, None, Utc::now()).unwrap();
        let notifier = Notifier::new(registry.clone(), 5, None);

        let transport = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
            blocked: 1,
        });
        let (tx, rx) = mpsc::channel(4);
        let worker = spawn_delivery_worker(rx, transport.clone(), notifier);

        tx.send(DeliveryBatch {
            cycle_finished_at: Utc::now(),
            deliveries: vec![delivery(1), delivery(2)],
        })
        .await
        .unwrap();
        drop(tx);
        worker.await.unwrap();

        assert_eq!(*transport.seen.lock().unwrap(), vec![1, 2]);
        assert!(!registry.get(1).unwrap().unwrap().is_active);
        assert!(registry.get(2).unwrap().unwrap().is_active);
    }
}
