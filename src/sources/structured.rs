// src/sources/structured.rs

//! HTML pages that embed machine-readable listings.
//!
//! Per page, in order: schema.org `JobPosting` blocks in
//! `<script type="application/ld+json">`, then a Next.js `__NEXT_DATA__`
//! job list when configured, then CSS listing cards when configured.
//! The first layer that yields anything wins.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::time::Instant;
use url::Url;

use super::html::CardSelectors;
use super::http::PageSource;
use super::json_api::group_thousands;
use super::{merge_pages, resolve_link, SourceAdapter, Strategy};
use crate::error::SourceError;
use crate::model::RawCandidate;

static LD_JSON: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static NEXT_DATA: Lazy<Selector> = Lazy::new(|| Selector::parse("script#__NEXT_DATA__").unwrap());

/// Where a Next.js page keeps its job list.
#[derive(Debug, Clone, Copy)]
pub struct NextDataSpec {
    /// JSON pointer to the jobs array, e.g. `/props/pageProps/jobSearchResult/jobs`.
    pub jobs_pointer: &'static str,
    /// Detail link with `{id}` replaced by the job id.
    pub link_template: &'static str,
}

pub struct StructuredHtmlSource {
    name: String,
    pages: PageSource,
    base: Option<Url>,
    next_data: Option<NextDataSpec>,
    cards: Option<CardSelectors>,
    default_location: Option<String>,
    default_company: Option<String>,
}

impl StructuredHtmlSource {
    pub fn new(name: impl Into<String>, pages: PageSource, base: Option<Url>) -> Self {
        Self {
            name: name.into(),
            pages,
            base,
            next_data: None,
            cards: None,
            default_location: None,
            default_company: None,
        }
    }

    pub fn from_fixture(name: impl Into<String>, html: &str, base: Option<Url>) -> Self {
        Self::new(name, PageSource::Fixture(vec![html.to_string()]), base)
    }

    pub fn with_next_data(mut self, spec: NextDataSpec) -> Self {
        self.next_data = Some(spec);
        self
    }

    pub fn with_cards(mut self, cards: CardSelectors) -> Self {
        self.cards = Some(cards);
        self
    }

    /// Forced location (e.g. remote-only boards) and fallback company.
    pub fn with_defaults(mut self, location: Option<&str>, company: Option<&str>) -> Self {
        self.default_location = location.map(str::to_string);
        self.default_company = company.map(str::to_string);
        self
    }

    fn parse_page(&self, html: &str) -> Result<Vec<RawCandidate>, SourceError> {
        let doc = Html::parse_document(html);
        let mut recognised = false;

        let ld_blocks: Vec<String> = doc
            .select(&LD_JSON)
            .map(|s| s.text().collect::<String>())
            .collect();
        if !ld_blocks.is_empty() {
            recognised = true;
            // Unparsable blocks are skipped.
            let values: Vec<Value> = ld_blocks
                .iter()
                .filter_map(|block| serde_json::from_str(block.trim()).ok())
                .collect();
            let items: Vec<RawCandidate> = values
                .iter()
                .flat_map(job_postings)
                .filter_map(|p| from_json_ld(p, self.base.as_ref()))
                .collect();
            if !items.is_empty() {
                return Ok(items);
            }
        }

        if let Some(spec) = &self.next_data {
            if let Some(script) = doc.select(&NEXT_DATA).next() {
                recognised = true;
                let raw = script.text().collect::<String>();
                let data: Value = serde_json::from_str(raw.trim())
                    .map_err(|e| SourceError::parse(format!("__NEXT_DATA__: {e}")))?;
                let items = from_next_data(&data, spec);
                if !items.is_empty() {
                    return Ok(items);
                }
            }
        }

        if let Some(cards) = &self.cards {
            let items = cards.extract(&doc, self.base.as_ref());
            if !items.is_empty() {
                return Ok(items);
            }
        }

        if recognised {
            Ok(Vec::new())
        } else {
            Err(SourceError::parse("page carries no structured job data"))
        }
    }
}

impl StructuredHtmlSource {
    async fn collect(&self, limit: usize, deadline: Option<Instant>) -> Result<Vec<RawCandidate>, SourceError> {
        let pages = self
            .pages
            .pages(deadline)
            .await
            .into_iter()
            .map(|body| body.and_then(|b| self.parse_page(&b)))
            .collect();
        let mut items = merge_pages(pages)?;
        for it in items.iter_mut() {
            if let Some(loc) = &self.default_location {
                it.location = Some(loc.clone());
            }
            if it.company.is_none() {
                it.company = self.default_company.clone();
            }
        }
        items.truncate(limit);
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for StructuredHtmlSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        Strategy::StructuredHtml
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawCandidate>, SourceError> {
        self.collect(limit, None).await
    }

    async fn fetch_until(&self, limit: usize, deadline: Instant) -> Result<Vec<RawCandidate>, SourceError> {
        self.collect(limit, Some(deadline)).await
    }
}

fn is_job_posting(v: &Value) -> bool {
    match v.get("@type") {
        Some(Value::String(t)) => t == "JobPosting",
        Some(Value::Array(ts)) => ts.iter().any(|t| t.as_str() == Some("JobPosting")),
        _ => false,
    }
}

/// Every `JobPosting` object in a JSON-LD block: a bare object, an array,
/// or an `@graph` container.
pub fn job_postings(v: &Value) -> Vec<&Value> {
    match v {
        Value::Array(items) => items.iter().flat_map(job_postings).collect(),
        Value::Object(map) => {
            if is_job_posting(v) {
                vec![v]
            } else if let Some(graph) = map.get("@graph") {
                job_postings(graph)
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn name_of(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Object(map) => text(map.get("name")),
        other => text(Some(other)),
    }
}

fn locality(v: Option<&Value>) -> Option<String> {
    let loc = match v? {
        Value::Array(list) => list.first()?,
        other => other,
    };
    match loc.get("address")? {
        addr @ Value::String(_) => text(Some(addr)),
        addr => text(addr.get("addressLocality")).or_else(|| text(addr.get("addressRegion"))),
    }
}

fn amount(v: Option<&Value>) -> Option<u64> {
    match v? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.replace(',', "").trim().parse::<f64>().ok().map(|f| f as u64),
        _ => None,
    }
    .filter(|n| *n > 0)
}

/// `baseSalary` as `{currency} {min}–{max}`, `{currency} {min}+`, or a single value.
pub fn base_salary(v: Option<&Value>) -> Option<String> {
    let sal = v?;
    let currency = text(sal.get("currency")).unwrap_or_else(|| "PHP".to_string());
    let value = sal.get("value")?;
    match (amount(value.get("minValue")), amount(value.get("maxValue"))) {
        (Some(lo), Some(hi)) => Some(format!("{currency} {}–{}", group_thousands(lo), group_thousands(hi))),
        (Some(lo), None) => Some(format!("{currency} {}+", group_thousands(lo))),
        _ => amount(value.get("value"))
            .or_else(|| amount(Some(value)))
            .map(|n| format!("{currency} {}", group_thousands(n))),
    }
}

fn date(v: Option<&Value>) -> Option<DateTime<Utc>> {
    let s = text(v)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)
                .map(|n| n.and_utc())
        })
}

fn identifier(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::Object(map) => text(map.get("value")),
        other => text(Some(other)),
    }
}

fn from_json_ld(item: &Value, base: Option<&Url>) -> Option<RawCandidate> {
    let link = text(item.get("url")).or_else(|| text(item.get("sameAs")))?;
    Some(RawCandidate {
        native_id: identifier(item.get("identifier")),
        title: text(item.get("title")),
        company: name_of(item.get("hiringOrganization")),
        location: locality(item.get("jobLocation")),
        salary: base_salary(item.get("baseSalary")),
        url: resolve_link(base, &link),
        description: text(item.get("description")),
        posted_at: date(item.get("datePosted")),
    })
}

fn from_next_data(data: &Value, spec: &NextDataSpec) -> Vec<RawCandidate> {
    let Some(jobs) = data.pointer(spec.jobs_pointer).and_then(Value::as_array) else {
        return Vec::new();
    };
    jobs.iter()
        .filter_map(|j| {
            let id = text(j.get("id"))?;
            Some(RawCandidate {
                url: Some(spec.link_template.replace("{id}", &id)),
                native_id: Some(id),
                title: text(j.get("title")).or_else(|| text(j.pointer("/roleTitles/0"))),
                company: text(j.get("companyName")).or_else(|| text(j.pointer("/advertiser/description"))),
                location: text(j.pointer("/locationWhereYouCanWork/0/label")).or_else(|| text(j.get("location"))),
                salary: text(j.get("salaryLabel")),
                description: text(j.get("teaser")),
                posted_at: date(j.get("listingDate")),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sources::html::CardSpec;

    const JSONLD_PAGE: &str = r#"<html><head>
      <script type="application/ld+json">{"@context":"https://schema.org","@type":"Organization","name":"x"}</script>
      <script type="application/ld+json">
        {"@context":"https://schema.org","@graph":[
          {"@type":"JobPosting","title":"Accounts Payable Specialist",
           "hiringOrganization":{"@type":"Organization","name":"SM Retail"},
           "url":"/job/ap-specialist-77","identifier":{"@type":"PropertyValue","value":"77"},
           "jobLocation":[{"@type":"Place","address":{"addressLocality":"Pasay"}}],
           "baseSalary":{"currency":"PHP","value":{"minValue":25000,"maxValue":"32,000"}},
           "datePosted":"2025-03-02"}
        ]}
      </script></head><body></body></html>"#;

    const NEXT_PAGE: &str = r#"<html><body>
      <script id="__NEXT_DATA__" type="application/json">
        {"props":{"pageProps":{"jobSearchResult":{"jobs":[
          {"id":"8001","title":"","roleTitles":["Technical Support"],
           "advertiser":{"description":"Concentrix"},
           "locationWhereYouCanWork":[{"label":"Quezon City"}],
           "listingDate":"2025-03-03T04:05:06Z"},
          {"title":"no id, skipped"}
        ]}}}}
      </script></body></html>"#;

    fn base() -> Url {
        Url::parse("https://www.kalibrr.com/job-board").unwrap()
    }

    #[test]
    fn json_ld_graph_posting_is_extracted() {
        let src = StructuredHtmlSource::from_fixture("Kalibrr", JSONLD_PAGE, Some(base()));
        let items = src.parse_page(JSONLD_PAGE).unwrap();
        assert_eq!(items.len(), 1);
        let c = &items[0];
        assert_eq!(c.native_id.as_deref(), Some("77"));
        assert_eq!(c.company.as_deref(), Some("SM Retail"));
        assert_eq!(c.location.as_deref(), Some("Pasay"));
        assert_eq!(c.salary.as_deref(), Some("PHP 25,000–32,000"));
        assert_eq!(c.url.as_deref(), Some("https://www.kalibrr.com/job/ap-specialist-77"));
        assert!(c.posted_at.is_some());
    }

    #[test]
    fn next_data_used_when_no_json_ld() {
        let src = StructuredHtmlSource::from_fixture("JobStreet PH", NEXT_PAGE, None).with_next_data(NextDataSpec {
            jobs_pointer: "/props/pageProps/jobSearchResult/jobs",
            link_template: "https://www.jobstreet.com.ph/job/{id}",
        });
        let items = src.parse_page(NEXT_PAGE).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Technical Support"));
        assert_eq!(items[0].company.as_deref(), Some("Concentrix"));
        assert_eq!(items[0].url.as_deref(), Some("https://www.jobstreet.com.ph/job/8001"));
        assert_eq!(items[0].location.as_deref(), Some("Quezon City"));
    }

    #[test]
    fn cards_are_the_last_resort() {
        let page = r#"<div class="job-item"><h3>Night Shift Nurse</h3><a href="/jobs/5">x</a></div>"#;
        let cards = CardSelectors::compile(&CardSpec {
            cards: &["div.job-item"],
            title: "h3",
            link: "a[href]",
            ..CardSpec::default()
        })
        .unwrap();
        let src = StructuredHtmlSource::from_fixture("Trabaho.ph", page, Some(Url::parse("https://trabaho.ph/").unwrap()))
            .with_cards(cards);
        let items = src.parse_page(page).unwrap();
        assert_eq!(items[0].url.as_deref(), Some("https://trabaho.ph/jobs/5"));
    }

    #[test]
    fn unrecognised_page_is_parse_error() {
        let src = StructuredHtmlSource::from_fixture("BossJob PH", "", None);
        let err = src.parse_page("<html><body>Please verify you are human</body></html>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceParseError);
    }

    #[tokio::test]
    async fn forced_location_overrides_page_value() {
        let src = StructuredHtmlSource::from_fixture("OnlineJobs.ph", JSONLD_PAGE, Some(base()))
            .with_defaults(Some("Philippines (Remote)"), Some("Remote Employer"));
        let items = src.fetch(5).await.unwrap();
        assert_eq!(items[0].location.as_deref(), Some("Philippines (Remote)"));
    }
}
