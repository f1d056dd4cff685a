// src/model.rs

//! Core records shared by every stage of the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// External chat identity of a subscriber.
pub type ChatId = i64;

/// Fixed job category enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    CallCenter,
    VirtualAssistant,
    Pogo,
    Remote,
    Accounting,
    ItTech,
    SalesMarketing,
    Healthcare,
    Unclassified,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::CallCenter,
        Category::VirtualAssistant,
        Category::Pogo,
        Category::Remote,
        Category::Accounting,
        Category::ItTech,
        Category::SalesMarketing,
        Category::Healthcare,
        Category::Unclassified,
    ];

    /// Stable slug used in storage, config files and the HTTP surface.
    pub fn slug(&self) -> &'static str {
        match self {
            Category::CallCenter => "call-center",
            Category::VirtualAssistant => "virtual-assistant",
            Category::Pogo => "pogo",
            Category::Remote => "remote",
            Category::Accounting => "accounting",
            Category::ItTech => "it-tech",
            Category::SalesMarketing => "sales-marketing",
            Category::Healthcare => "healthcare",
            Category::Unclassified => "unclassified",
        }
    }

    /// Human label for message rendering.
    pub fn label(&self) -> &'static str {
        match self {
            Category::CallCenter => "Call Center / BPO",
            Category::VirtualAssistant => "Virtual Assistant",
            Category::Pogo => "POGO / Online Gaming",
            Category::Remote => "Remote / WFH",
            Category::Accounting => "Accounting / Finance",
            Category::ItTech => "IT / Tech",
            Category::SalesMarketing => "Sales / Marketing",
            Category::Healthcare => "Healthcare",
            Category::Unclassified => "General",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts the slug or the human label, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.slug().eq_ignore_ascii_case(needle) || c.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownCategory(needle.to_string()))
    }
}

/// Subscriber-side category filter: a single category or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => *c == category,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryFilter::All => "all",
            CategoryFilter::Only(c) => c.slug(),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryFilter {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("all") || t.eq_ignore_ascii_case("lahat") {
            return Ok(CategoryFilter::All);
        }
        t.parse().map(CategoryFilter::Only)
    }
}

impl TryFrom<String> for CategoryFilter {
    type Error = UnknownCategory;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CategoryFilter> for String {
    fn from(f: CategoryFilter) -> Self {
        f.as_str().to_string()
    }
}

impl From<Category> for CategoryFilter {
    fn from(c: Category) -> Self {
        CategoryFilter::Only(c)
    }
}

/// One listing as a source adapter saw it, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub native_id: Option<String>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

/// A normalized job listing. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub fingerprint: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary_range: Option<String>,
    pub category: Category,
    pub source_name: String,
    pub url: String,
    pub posted_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub chat_id: ChatId,
    pub name: Option<String>,
    pub is_active: bool,
    pub category_filter: CategoryFilter,
    pub joined_at: DateTime<Utc>,
}

/// Outcome of one aggregation pass. Never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleResult {
    pub new_postings: Vec<Posting>,
    /// Candidates returned per source (before normalization).
    pub per_source_counts: BTreeMap<String, usize>,
    /// Only sources that failed appear here.
    pub per_source_errors: BTreeMap<String, ErrorKind>,
    /// Candidates discarded by the normalizer (missing title or url).
    pub dropped: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CycleResult {
    pub fn sources_failed(&self) -> usize {
        self.per_source_errors.len()
    }

    pub fn sources_succeeded(&self) -> usize {
        self.per_source_counts
            .keys()
            .filter(|name| !self.per_source_errors.contains_key(*name))
            .count()
    }

    /// One-line summary for the admin who triggered a manual run.
    pub fn summary(&self) -> String {
        format!(
            "sources ok: {}, failed: {}, new postings: {}",
            self.sources_succeeded(),
            self.sources_failed(),
            self.new_postings.len()
        )
    }
}
