// src/sources/html.rs

//! Raw HTML listing pages scraped with CSS selectors.
//!
//! Job boards rename their classes often, so a card may be described by
//! several selectors; the first one that matches anything wins.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::time::Instant;
use url::Url;

use super::http::PageSource;
use super::{merge_pages, resolve_link, SourceAdapter, Strategy};
use crate::error::SourceError;
use crate::model::RawCandidate;

/// Selector strings for one site's listing cards.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardSpec {
    /// Alternatives, tried in order.
    pub cards: &'static [&'static str],
    pub title: &'static str,
    pub link: &'static str,
    pub company: Option<&'static str>,
    pub location: Option<&'static str>,
    pub salary: Option<&'static str>,
    /// Drop `?query` from links (tracking parameters).
    pub strip_query: bool,
    /// Links must contain this host fragment to be kept.
    pub require_host: Option<&'static str>,
    /// Cards read per page.
    pub max_cards: usize,
}

/// Compiled [`CardSpec`].
#[derive(Debug, Clone)]
pub struct CardSelectors {
    cards: Vec<Selector>,
    title: Selector,
    link: Selector,
    company: Option<Selector>,
    location: Option<Selector>,
    salary: Option<Selector>,
    strip_query: bool,
    require_host: Option<&'static str>,
    max_cards: usize,
}

fn compile(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::parse(format!("bad selector '{css}': {e}")))
}

impl CardSelectors {
    pub fn compile(spec: &CardSpec) -> Result<Self, SourceError> {
        Ok(Self {
            cards: spec.cards.iter().map(|c| compile(c)).collect::<Result<_, _>>()?,
            title: compile(spec.title)?,
            link: compile(spec.link)?,
            company: spec.company.map(compile).transpose()?,
            location: spec.location.map(compile).transpose()?,
            salary: spec.salary.map(compile).transpose()?,
            strip_query: spec.strip_query,
            require_host: spec.require_host,
            max_cards: if spec.max_cards == 0 { usize::MAX } else { spec.max_cards },
        })
    }

    /// Candidates from every matching card of an already parsed document.
    pub fn extract(&self, doc: &Html, base: Option<&Url>) -> Vec<RawCandidate> {
        let Some(cards) = self
            .cards
            .iter()
            .map(|sel| doc.select(sel).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
        else {
            return Vec::new();
        };

        cards
            .into_iter()
            .take(self.max_cards)
            .filter_map(|card| self.card(card, base))
            .collect()
    }

    fn card(&self, card: ElementRef<'_>, base: Option<&Url>) -> Option<RawCandidate> {
        let title = first_text(card, &self.title)?;
        let href = card.select(&self.link).find_map(|a| a.value().attr("href"))?;
        let mut link = resolve_link(base, href)?;
        if self.strip_query {
            if let Some(i) = link.find('?') {
                link.truncate(i);
            }
        }
        if let Some(host) = self.require_host {
            if !link.contains(host) {
                return None;
            }
        }

        Some(RawCandidate {
            title: Some(title),
            url: Some(link),
            company: self.company.as_ref().and_then(|s| first_text(card, s)),
            location: self.location.as_ref().and_then(|s| first_text(card, s)),
            salary: self.salary.as_ref().and_then(|s| first_text(card, s)),
            ..RawCandidate::default()
        })
    }
}

fn first_text(scope: ElementRef<'_>, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|t| !t.is_empty())
}

pub struct HtmlSource {
    name: String,
    pages: PageSource,
    base: Option<Url>,
    cards: CardSelectors,
    default_location: Option<String>,
    default_company: Option<String>,
}

impl HtmlSource {
    pub fn new(name: impl Into<String>, pages: PageSource, base: Option<Url>, cards: CardSelectors) -> Self {
        Self {
            name: name.into(),
            pages,
            base,
            cards,
            default_location: None,
            default_company: None,
        }
    }

    pub fn from_fixture(name: impl Into<String>, html: &str, base: Option<Url>, cards: CardSelectors) -> Self {
        Self::new(name, PageSource::Fixture(vec![html.to_string()]), base, cards)
    }

    pub fn with_defaults(mut self, location: Option<&str>, company: Option<&str>) -> Self {
        self.default_location = location.map(str::to_string);
        self.default_company = company.map(str::to_string);
        self
    }

    fn parse_page(&self, html: &str) -> Result<Vec<RawCandidate>, SourceError> {
        let doc = Html::parse_document(html);
        let items = self.cards.extract(&doc, self.base.as_ref());
        if items.is_empty() {
            return Err(SourceError::parse("no listing cards matched"));
        }
        Ok(items)
    }
}

impl HtmlSource {
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
            if it.location.is_none() {
                it.location = self.default_location.clone();
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
impl SourceAdapter for HtmlSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        Strategy::Html
    }

    async fn fetch(&self, limit: usize) -> Result<Vec<RawCandidate>, SourceError> {
        self.collect(limit, None).await
    }

    async fn fetch_until(&self, limit: usize, deadline: Instant) -> Result<Vec<RawCandidate>, SourceError> {
        self.collect(limit, Some(deadline)).await
    }
}
