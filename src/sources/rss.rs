// src/sources/rss.rs

//! RSS 2.0 feeds (Indeed, PhilJobNet, ...).
//!
//! Elements are matched by local name, so namespaced extensions such as
//! `<indeed:company>` land in the same fields as plain ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tokio::time::Instant;

use super::http::PageSource;
use super::{merge_pages, SourceAdapter, Strategy};
use crate::error::SourceError;
use crate::model::RawCandidate;

/// Per-feed parsing options.
#[derive(Debug, Clone, Default)]
pub struct RssOptions {
    /// Pull `Company:` / `Location:` lines out of the description.
    pub fields_from_description: bool,
    /// Location when the feed carries none.
    pub default_location: Option<String>,
    /// Company when the feed carries none (e.g. "Upwork Client").
    pub default_company: Option<String>,
}

pub struct RssSource {
    name: String,
    pages: PageSource,
    options: RssOptions,
}

impl RssSource {
    pub fn new(name: impl Into<String>, pages: PageSource, options: RssOptions) -> Self {
        Self {
            name: name.into(),
            pages,
            options,
        }
    }

    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self::new(name, PageSource::Fixture(vec![xml.to_string()]), RssOptions::default())
    }

    pub fn with_options(mut self, options: RssOptions) -> Self {
        self.options = options;
        self
    }

    fn apply_options(&self, mut c: RawCandidate) -> RawCandidate {
        if self.options.fields_from_description {
            if let Some(desc) = c.description.as_deref() {
                let (company, location) = fields_from_description(desc);
                c.company = c.company.or(company);
                c.location = c.location.or(location);
            }
        }
        if c.company.is_none() {
            c.company = self.options.default_company.clone();
        }
        if c.location.is_none() {
            c.location = self.options.default_location.clone();
        }
        c
    }
}

impl RssSource {
    async fn collect(&self, limit: usize, deadline: Option<Instant>) -> Result<Vec<RawCandidate>, SourceError> {
        let pages = self
            .pages
            .pages(deadline)
            .await
            .into_iter()
            .map(|body| body.and_then(|b| parse_feed(&b)))
            .collect();
        let mut items: Vec<RawCandidate> = merge_pages(pages)?
            .into_iter()
            .map(|c| self.apply_options(c))
            .collect();
        items.truncate(limit);
        Ok(items)
    }
}

#[async_trait]
impl SourceAdapter for RssSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        Strategy::Rss
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawCandidate>, SourceError> {
        self.collect(limit, None).await
    }

    async fn fetch_until(&self, limit: usize, deadline: Instant) -> Result<Vec<RawCandidate>, SourceError> {
        self.collect(limit, Some(deadline)).await
    }
}

#[derive(Default)]
struct ItemFields {
    guid: Option<String>,
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
    pub_date: Option<String>,
    company: Option<String>,
    city: Option<String>,
    state: Option<String>,
    salary: Option<String>,
}

impl ItemFields {
    fn slot(&mut self, element: &[u8]) -> Option<&mut Option<String>> {
        match element {
            b"guid" => Some(&mut self.guid),
            b"title" => Some(&mut self.title),
            b"link" => Some(&mut self.link),
            b"description" => Some(&mut self.description),
            b"pubDate" => Some(&mut self.pub_date),
            b"company" => Some(&mut self.company),
            b"city" => Some(&mut self.city),
            b"state" => Some(&mut self.state),
            b"salary" => Some(&mut self.salary),
            _ => None,
        }
    }

    fn into_candidate(self) -> RawCandidate {
        let location = [self.city, self.state]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        RawCandidate {
            native_id: self.guid,
            title: self.title,
            company: self.company,
            location: (!location.is_empty()).then_some(location),
            salary: self.salary,
            url: self.link.map(|l| l.trim().to_string()),
            description: self.description,
            posted_at: self.pub_date.as_deref().and_then(parse_rfc2822),
        }
    }
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), 0))
}

/// HTML entities that are not valid XML but show up in real feeds.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse one RSS document into candidates, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<RawCandidate>, SourceError> {
    let xml = scrub_html_entities_for_xml(xml);
    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut saw_channel = false;
    let mut current: Option<ItemFields> = None;
    // Element we are collecting text for, if it is a known item field.
    let mut field: Option<Vec<u8>> = None;
    let mut out = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = e.local_name();
                let local = local.as_ref();
                match local {
                    b"channel" => saw_channel = true,
                    b"item" => current = Some(ItemFields::default()),
                    _ if current.is_some() => field = Some(local.to_vec()),
                    _ => {}
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                if local.as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        out.push(item.into_candidate());
                    }
                }
                field = None;
            }
            Event::Text(t) => {
                if let (Some(item), Some(name)) = (current.as_mut(), field.as_deref()) {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    if let Some(slot) = item.slot(name) {
                        slot.get_or_insert_with(String::new).push_str(&text);
                    }
                }
            }
            Event::CData(c) => {
                if let (Some(item), Some(name)) = (current.as_mut(), field.as_deref()) {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    if let Some(slot) = item.slot(name) {
                        slot.get_or_insert_with(String::new).push_str(&text);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_channel {
        return Err(SourceError::parse("document has no RSS <channel>"));
    }
    Ok(out)
}

/// `Company:` / `Employer:` and `Location:` / `Address:` / `City:` lines.
pub fn fields_from_description(desc: &str) -> (Option<String>, Option<String>) {
    static RE_COMPANY: OnceCell<Regex> = OnceCell::new();
    static RE_LOCATION: OnceCell<Regex> = OnceCell::new();

    // Work on a tag-free copy that keeps line breaks.
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)<br\s*/?>|</p>|</li>|</div>").unwrap());
    let with_breaks = re_tags.replace_all(desc, "\n");
    let plain = html_escape::decode_html_entities(&with_breaks).to_string();
    static RE_STRIP: OnceCell<Regex> = OnceCell::new();
    let plain = RE_STRIP
        .get_or_init(|| Regex::new(r"(?is)<[^>]+>").unwrap())
        .replace_all(&plain, "")
        .to_string();

    let company = RE_COMPANY
        .get_or_init(|| Regex::new(r"(?im)(?:Company|Employer):\s*([^\n]+)").unwrap())
        .captures(&plain)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    let location = RE_LOCATION
        .get_or_init(|| Regex::new(r"(?im)(?:Location|Address|City):\s*([^\n]+)").unwrap())
        .captures(&plain)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    (company, location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:indeed="https://www.indeed.com/about/">
  <channel>
    <title>Indeed</title>
    <item>
      <title>Call Center Agent &ndash; Night Shift</title>
      <link>https://ph.indeed.com/viewjob?jk=abc</link>
      <guid isPermaLink="false">abc</guid>
      <description><![CDATA[<p>Inbound voice account</p>]]></description>
      <pubDate>Mon, 03 Mar 2025 08:00:00 GMT</pubDate>
      <indeed:company>Acme BPO</indeed:company>
      <indeed:city>Makati</indeed:city>
      <indeed:state>NCR</indeed:state>
      <indeed:salary>PHP 20,000 a month</indeed:salary>
    </item>
    <item>
      <title>Virtual Assistant</title>
      <link>https://ph.indeed.com/viewjob?jk=def</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_namespaced_fields() {
        let items = parse_feed(FEED).unwrap();
        assert_eq!(items.len(), 2);
        let a = &items[0];
        assert_eq!(a.title.as_deref(), Some("Call Center Agent - Night Shift"));
        assert_eq!(a.native_id.as_deref(), Some("abc"));
        assert_eq!(a.company.as_deref(), Some("Acme BPO"));
        assert_eq!(a.location.as_deref(), Some("Makati, NCR"));
        assert_eq!(a.salary.as_deref(), Some("PHP 20,000 a month"));
        assert_eq!(a.description.as_deref(), Some("<p>Inbound voice account</p>"));
        assert!(a.posted_at.is_some());
        assert!(items[1].location.is_none());
    }

    #[test]
    fn html_error_page_is_a_parse_error() {
        let err = parse_feed("<html><body>Access denied</body></html>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceParseError);
    }

    #[test]
    fn description_fields_are_extracted() {
        let (c, l) = fields_from_description("Company: DOLE Partner Inc.<br/>Location: Cebu City<br/>Apply");
        assert_eq!(c.as_deref(), Some("DOLE Partner Inc."));
        assert_eq!(l.as_deref(), Some("Cebu City"));
    }

    #[tokio::test]
    async fn fixture_source_honours_limit_and_defaults() {
        let src = RssSource::from_fixture("Indeed PH", FEED).with_options(RssOptions {
            default_location: Some("Philippines".into()),
            ..RssOptions::default()
        });
        let items = src.fetch(1).await.unwrap();
        assert_eq!(items.len(), 1);
        let all = src.fetch(10).await.unwrap();
        assert_eq!(all[1].location.as_deref(), Some("Philippines"));
    }
}
