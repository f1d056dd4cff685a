// src/sources/json_api.rs

//! Public JSON APIs (RemoteOK, Jooble).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::time::Instant;

use super::http::PageSource;
use super::{merge_pages, SourceAdapter, Strategy};
use crate::error::SourceError;
use crate::model::RawCandidate;

/// Response layouts this adapter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiShape {
    /// Top-level array; element 0 is a legal notice.
    RemoteOk,
    /// `{ "jobs": [ ... ] }`
    Jooble,
}

pub struct JsonApiSource {
    name: String,
    shape: ApiShape,
    pages: PageSource,
    location: Option<String>,
}

impl JsonApiSource {
    pub fn new(name: impl Into<String>, shape: ApiShape, pages: PageSource) -> Self {
        Self {
            name: name.into(),
            shape,
            pages,
            location: None,
        }
    }

    pub fn from_fixture(name: impl Into<String>, shape: ApiShape, body: &str) -> Self {
        Self::new(name, shape, PageSource::Fixture(vec![body.to_string()]))
    }

    /// Every posting of this API gets `location` (remote-only boards).
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl JsonApiSource {
    async fn collect(&self, limit: usize, deadline: Option<Instant>) -> Result<Vec<RawCandidate>, SourceError> {
        let shape = self.shape;
        let pages = self
            .pages
            .pages(deadline)
            .await
            .into_iter()
            .map(|body| body.and_then(|b| parse_body(shape, &b)))
            .collect();
        let mut items = merge_pages(pages)?;
        if let Some(loc) = &self.location {
            for it in items.iter_mut() {
                it.location = Some(loc.clone());
            }
        }
        items.truncate(limit);
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for JsonApiSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        Strategy::JsonApi
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawCandidate>, SourceError> {
        self.collect(limit, None).await
    }

    async fn fetch_until(&self, limit: usize, deadline: Instant) -> Result<Vec<RawCandidate>, SourceError> {
        self.collect(limit, Some(deadline)).await
    }
}

pub fn parse_body(shape: ApiShape, body: &str) -> Result<Vec<RawCandidate>, SourceError> {
    let v: Value = serde_json::from_str(body)?;
    match shape {
        ApiShape::RemoteOk => parse_remoteok(&v),
        ApiShape::Jooble => parse_jooble(&v),
    }
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn u64_field(v: &Value, key: &str) -> Option<u64> {
    match v.get(key)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| *n > 0)
}

/// Thousands separators, `25000` → `25,000`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn remoteok_salary(item: &Value) -> Option<String> {
    match (u64_field(item, "salary_min"), u64_field(item, "salary_max")) {
        (Some(lo), Some(hi)) => Some(format!("${}–${}/yr", group_thousands(lo), group_thousands(hi))),
        (Some(lo), None) => Some(format!("${}+/yr", group_thousands(lo))),
        _ => None,
    }
}

fn parse_iso(s: Option<String>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s?.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn parse_remoteok(v: &Value) -> Result<Vec<RawCandidate>, SourceError> {
    let arr = v
        .as_array()
        .ok_or_else(|| SourceError::parse("RemoteOK: expected a top-level array"))?;

    Ok(arr
        .iter()
        .skip(1)
        .filter(|item| item.get("legal").is_none())
        .map(|item| {
            let tags = item
                .get("tags")
                .and_then(Value::as_array)
                .map(|t| t.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" "))
                .unwrap_or_default();
            let desc = str_field(item, "description").unwrap_or_default();
            RawCandidate {
                native_id: str_field(item, "id"),
                title: str_field(item, "position"),
                company: str_field(item, "company"),
                location: str_field(item, "location"),
                salary: remoteok_salary(item),
                url: str_field(item, "url"),
                description: Some(format!("{tags} {desc}").trim().to_string()).filter(|s| !s.is_empty()),
                posted_at: parse_iso(str_field(item, "date")),
            }
        })
        .collect())
}

fn parse_jooble(v: &Value) -> Result<Vec<RawCandidate>, SourceError> {
    let jobs = v
        .get("jobs")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::parse("Jooble: missing 'jobs' array"))?;

    Ok(jobs
        .iter()
        .map(|j| RawCandidate {
            native_id: str_field(j, "id"),
            title: str_field(j, "title"),
            company: str_field(j, "company"),
            location: str_field(j, "location"),
            salary: str_field(j, "salary"),
            url: str_field(j, "link"),
            description: str_field(j, "snippet"),
            posted_at: str_field(j, "updated").and_then(|s| {
                parse_iso(Some(s.clone())).or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                        .ok()
                        .map(|n| n.and_utc())
                })
            }),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const REMOTEOK: &str = r#"[
      {"legal": "API Terms of Service apply"},
      {"id": "98765", "position": "Customer Support Specialist", "company": "Globex",
       "url": "https://remoteok.com/remote-jobs/98765", "tags": ["support", "remote"],
       "description": "Help customers", "salary_min": 30000, "salary_max": 45000,
       "date": "2025-03-01T10:00:00+00:00"},
      {"id": 5, "position": "Rust Engineer", "company": "Initech",
       "url": "https://remoteok.com/remote-jobs/5", "salary_min": 90000}
    ]"#;

    #[test]
    fn remoteok_skips_legal_notice_and_formats_salary() {
        let items = parse_body(ApiShape::RemoteOk, REMOTEOK).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].native_id.as_deref(), Some("98765"));
        assert_eq!(items[0].salary.as_deref(), Some("$30,000–$45,000/yr"));
        assert!(items[0].posted_at.is_some());
        assert_eq!(items[1].native_id.as_deref(), Some("5"));
        assert_eq!(items[1].salary.as_deref(), Some("$90,000+/yr"));
    }

    #[test]
    fn jooble_shape_parses_jobs_array() {
        let body = r#"{"totalCount": 1, "jobs": [{"id": -42, "title": "BPO Agent",
            "company": "Teleperf", "link": "https://jooble.org/desc/-42",
            "location": "Pasig", "salary": "", "snippet": "Voice account",
            "updated": "2025-03-02T09:15:00.0000000"}]}"#;
        let items = parse_body(ApiShape::Jooble, body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].native_id.as_deref(), Some("-42"));
        assert!(items[0].salary.is_none());
        assert!(items[0].posted_at.is_some());
    }

    #[test]
    fn wrong_shape_is_parse_error() {
        let err = parse_body(ApiShape::Jooble, "[1,2,3]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceParseError);
        let err = parse_body(ApiShape::RemoteOk, "not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceParseError);
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(5), "5");
        assert_eq!(group_thousands(1234), "1,234");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }

    #[tokio::test]
    async fn fixed_location_applies_to_every_item() {
        let src = JsonApiSource::from_fixture("RemoteOK", ApiShape::RemoteOk, REMOTEOK)
            .with_location("Remote (Worldwide)");
        let items = src.fetch(25).await.unwrap();
        assert!(items.iter().all(|i| i.location.as_deref() == Some("Remote (Worldwide)")));
    }
}
