// src/notifier.rs

//! Per-subscriber delivery lists for a cycle's new postings.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;

use crate::error::{FailureKind, StorageError};
use crate::model::{CategoryFilter, ChatId, Posting, Subscriber};
use crate::storage::SubscriberRegistry;

/// What one chat receives after a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub chat_id: ChatId,
    /// Most recent first, never empty.
    pub postings: Vec<Posting>,
    /// Matching postings cut by the cap.
    pub remaining: usize,
    /// The broadcast group rather than a subscriber.
    pub group: bool,
}

/// Everything the transport should send for one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryBatch {
    pub cycle_finished_at: DateTime<Utc>,
    pub deliveries: Vec<Delivery>,
}

/// Indices of `postings` ordered most recently discovered first.
///
/// Ties on `first_seen_at` fall back to `posted_at`, then to input order
/// (later first), which matches the store's ordering.
fn recent_first(postings: &[Posting]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..postings.len()).collect();
    idx.sort_by(|&a, &b| {
        let (pa, pb) = (&postings[a], &postings[b]);
        pb.first_seen_at
            .cmp(&pa.first_seen_at)
            .then_with(|| pb.posted_at.cmp(&pa.posted_at))
            .then_with(|| b.cmp(&a))
    });
    idx
}

/// Up to `cap` postings matching `filter`, plus how many more matched.
fn select(postings: &[Posting], order: &[usize], filter: CategoryFilter, cap: usize) -> (Vec<Posting>, usize) {
    let matching: Vec<&Posting> = order
        .iter()
        .map(|&i| &postings[i])
        .filter(|p| filter.matches(p.category))
        .collect();
    let remaining = matching.len().saturating_sub(cap);
    (matching.into_iter().take(cap).cloned().collect(), remaining)
}

/// Pure core of the notifier: one entry per active subscriber with at least
/// one matching posting.
pub fn build_deliveries(
    new_postings: &[Posting],
    subscribers: &[Subscriber],
    max_per_delivery: usize,
) -> BTreeMap<ChatId, Delivery> {
    let order = recent_first(new_postings);
    subscribers
        .iter()
        .filter(|s| s.is_active)
        .filter_map(|s| {
            let (postings, remaining) = select(new_postings, &order, s.category_filter, max_per_delivery);
            (!postings.is_empty()).then(|| {
                (
                    s.chat_id,
                    Delivery {
                        chat_id: s.chat_id,
                        postings,
                        remaining,
                        group: false,
                    },
                )
            })
        })
        .collect()
}

/// Broadcast group settings.
#[derive(Debug, Clone, Copy)]
pub struct GroupBroadcast {
    pub chat_id: ChatId,
    pub max_postings: usize,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    registry: SubscriberRegistry,
    max_per_delivery: usize,
    group: Option<GroupBroadcast>,
}

impl Notifier {
    pub fn new(registry: SubscriberRegistry, max_per_delivery: usize, group: Option<GroupBroadcast>) -> Self {
        Self {
            registry,
            max_per_delivery,
            group,
        }
    }

    /// Deliveries for every active subscriber, plus the group when
    /// configured. Empty when there is nothing new.
    pub fn build_deliveries(&self, new_postings: &[Posting]) -> Result<BTreeMap<ChatId, Delivery>, StorageError> {
        if new_postings.is_empty() {
            return Ok(BTreeMap::new());
        }
        let subscribers = self.registry.list_active(None)?;
        let mut out = build_deliveries(new_postings, &subscribers, self.max_per_delivery);

        // A chat registered as a subscriber keeps its own filter and
        // deactivation handling; it never doubles as the broadcast group.
        let group = self.group.filter(|g| {
            let taken = subscribers.iter().any(|s| s.chat_id == g.chat_id);
            if taken {
                tracing::warn!(target: "notify", chat_id = g.chat_id, "group chat is also a subscriber, broadcast skipped");
            }
            !taken
        });
        if let Some(g) = group {
            let order = recent_first(new_postings);
            let (postings, remaining) = select(new_postings, &order, CategoryFilter::All, g.max_postings);
            if !postings.is_empty() {
                out.insert(
                    g.chat_id,
                    Delivery {
                        chat_id: g.chat_id,
                        postings,
                        remaining,
                        group: true,
                    },
                );
            }
        }

        tracing::info!(
            target: "notify",
            new = new_postings.len(),
            subscribers = subscribers.len(),
            deliveries = out.len(),
            "deliveries built"
        );
        Ok(out)
    }

    /// Transport feedback. Only a permanent failure changes state: the chat
    /// is deactivated and drops out of later deliveries.
    pub fn report_delivery_failure(&self, chat_id: ChatId, kind: FailureKind) -> Result<(), StorageError> {
        counter!("delivery_failures_total", "kind" => kind.as_str()).increment(1);
        match kind {
            FailureKind::PermanentlyBlocked => {
                let known = self.registry.deactivate(chat_id)?;
                tracing::warn!(target: "notify", chat_id, known, "chat unreachable, subscriber deactivated");
            }
            FailureKind::Transient => {
                tracing::debug!(target: "notify", chat_id, "transient delivery failure, left to transport");
            }
        }
        Ok(())
    }
}
