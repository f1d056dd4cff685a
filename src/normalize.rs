// src/normalize.rs

//! Raw candidate → canonical [`Posting`].
//!
//! Pure: no I/O, the ingestion time is passed in. Candidates without a title
//! or a usable absolute url are dropped and counted by the caller.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::classify::Classifier;
use crate::model::{Posting, RawCandidate};

pub const DEFAULT_COMPANY: &str = "Not specified";
pub const DEFAULT_LOCATION: &str = "Philippines";

const MAX_TITLE_CHARS: usize = 200;
const MAX_FIELD_CHARS: usize = 120;
const MAX_SALARY_CHARS: usize = 60;
const CLASSIFY_DESCRIPTION_CHARS: usize = 300;

/// Decode entities, strip tags, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // Normalize “ ” ‘ ’ to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() > max {
        s.chars().take(max).collect()
    } else {
        s
    }
}

fn cleaned(field: Option<&str>, max: usize) -> Option<String> {
    field
        .map(clean_text)
        .filter(|s| !s.is_empty())
        .map(|s| truncate_chars(s, max))
}

/// `source:native_id` when the source has ids, else `source:` + a hash of
/// the lowercased `title|company|url`.
pub fn fingerprint(source_name: &str, native_id: Option<&str>, title: &str, company: &str, url: &str) -> String {
    if let Some(id) = native_id.map(str::trim).filter(|id| !id.is_empty()) {
        return format!("{source_name}:{id}");
    }
    let material = format!("{title}|{company}|{url}").to_lowercase();
    let digest = Sha256::digest(material.as_bytes());
    format!("{source_name}:{}", hex::encode(&digest[..16]))
}

/// Best-effort salary text out of a free-form description.
pub fn extract_salary(description: &str) -> Option<String> {
    static RE_LABELLED: OnceCell<Regex> = OnceCell::new();
    let labelled = RE_LABELLED.get_or_init(|| {
        Regex::new(r"(?i)\b(?:salary|pay|rate|compensation|budget)\s*:\s*([^\n<]{1,80})").unwrap()
    });
    if let Some(m) = labelled.captures(description).and_then(|c| c.get(1)) {
        let v = clean_text(m.as_str());
        if !v.is_empty() {
            return Some(truncate_chars(v, MAX_SALARY_CHARS));
        }
    }

    static RE_AMOUNT: OnceCell<Regex> = OnceCell::new();
    let amount = RE_AMOUNT.get_or_init(|| {
        Regex::new(r"(?:₱|PHP\s?|\$)\s?\d[\d,]*(?:\.\d+)?(?:\s*[-–]\s*(?:₱|PHP\s?|\$)?\s?\d[\d,]*(?:\.\d+)?)?")
            .unwrap()
    });
    amount
        .find(description)
        .map(|m| truncate_chars(clean_text(m.as_str()), MAX_SALARY_CHARS))
}

fn usable_url(raw: Option<&str>) -> Option<String> {
    let u = raw?.trim();
    let parsed = url::Url::parse(u).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| u.to_string())
}

/// Maps raw candidates into postings using an injected classifier.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    classifier: Classifier,
}

impl Normalizer {
    pub fn new(classifier: Classifier) -> Self {
        Self { classifier }
    }

    /// `None` when title or url is missing/malformed.
    pub fn normalize(&self, raw: &RawCandidate, source_name: &str, now: DateTime<Utc>) -> Option<Posting> {
        let title = cleaned(raw.title.as_deref(), MAX_TITLE_CHARS)?;
        let url = usable_url(raw.url.as_deref())?;

        let company =
            cleaned(raw.company.as_deref(), MAX_FIELD_CHARS).unwrap_or_else(|| DEFAULT_COMPANY.to_string());
        let location =
            cleaned(raw.location.as_deref(), MAX_FIELD_CHARS).unwrap_or_else(|| DEFAULT_LOCATION.to_string());

        let description = raw.description.as_deref().unwrap_or_default();
        let salary_range = cleaned(raw.salary.as_deref(), MAX_SALARY_CHARS).or_else(|| extract_salary(description));

        let short_desc = truncate_chars(clean_text(description), CLASSIFY_DESCRIPTION_CHARS);
        let category = self.classifier.classify(&title, &short_desc);

        let fp = fingerprint(source_name, raw.native_id.as_deref(), &title, &company, &url);

        Some(Posting {
            fingerprint: fp,
            title,
            company,
            location,
            salary_range,
            category,
            source_name: source_name.to_string(),
            url,
            posted_at: raw.posted_at,
            first_seen_at: now,
        })
    }

    /// Normalize a batch, returning the postings and how many were dropped.
    pub fn normalize_all<'a, I>(&self, batch: I, now: DateTime<Utc>) -> (Vec<Posting>, usize)
    where
        I: IntoIterator<Item = (&'a str, &'a RawCandidate)>,
    {
        let mut dropped = 0usize;
        let mut out = Vec::new();
        for (source, raw) in batch {
            match self.normalize(raw, source, now) {
                Some(p) => out.push(p),
                None => dropped += 1,
            }
        }
        (out, dropped)
    }
}
