// src/sources/catalog.rs

//! The default set of ten job boards.
//!
//! Adding a board means adding one entry here; nothing downstream knows
//! source names.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use url::Url;

use super::html::{CardSelectors, CardSpec, HtmlSource};
use super::http::{HttpFetcher, PageRequest, PageSource, ACCEPT_JSON, ACCEPT_XML};
use super::json_api::{ApiShape, JsonApiSource};
use super::rss::{RssOptions, RssSource};
use super::structured::{NextDataSpec, StructuredHtmlSource};
use super::SourceAdapter;
use crate::config::AppConfig;

const PAGE_DELAY: Duration = Duration::from_millis(500);
const LINKEDIN_PAGE_DELAY: Duration = Duration::from_secs(2);

const INDEED_TERMS: [&str; 10] = [
    "call center",
    "BPO customer service",
    "virtual assistant",
    "work from home Philippines",
    "POGO gaming",
    "accounting Philippines",
    "IT support Philippines",
    "sales representative Philippines",
    "nurse Philippines",
    "data entry Philippines",
];

const JOOBLE_TERMS: [&str; 6] = [
    "call center",
    "virtual assistant",
    "BPO",
    "work from home",
    "POGO gaming",
    "customer service",
];

const LINKEDIN_TERMS: [&str; 5] = [
    "call center agent Philippines",
    "virtual assistant Philippines",
    "BPO customer service Philippines",
    "work from home Philippines",
    "POGO online gaming Philippines",
];

const JOBSTREET_PAGES: [&str; 8] = [
    "call-center-jobs",
    "bpo-jobs",
    "virtual-assistant-jobs",
    "customer-service-jobs",
    "work-from-home-jobs",
    "accounting-jobs",
    "information-technology-jobs",
    "healthcare-nursing-jobs",
];

const ONLINEJOBS_TERMS: [&str; 8] = [
    "virtual-assistant",
    "data-entry",
    "customer-service",
    "social-media",
    "bookkeeper",
    "content-writer",
    "graphic-designer",
    "web-developer",
];

const KALIBRR_TERMS: [&str; 5] = ["call center", "virtual assistant", "BPO", "customer service", "work from home"];
const BOSSJOB_TERMS: [&str; 4] = ["call center", "virtual assistant", "customer service", "bpo"];
const TRABAHO_TERMS: [&str; 4] = ["call-center", "virtual-assistant", "bpo", "work-from-home"];

pub const JOOBLE_CARDS: CardSpec = CardSpec {
    cards: &["article"],
    title: "h2, h3",
    link: "a[href]",
    company: Some(r#"[class*="company"], [class*="employer"]"#),
    location: Some(r#"[class*="location"]"#),
    salary: None,
    strip_query: false,
    require_host: None,
    max_cards: 15,
};

pub const LINKEDIN_CARDS: CardSpec = CardSpec {
    cards: &[
        "div.base-card, div.job-search-card, div.base-search-card",
        "li.result-card, li.jobs-search-results__list-item",
        r#"div[data-entity-urn*="jobPosting"]"#,
    ],
    title: "h3.base-search-card__title, h3, h2",
    link: "a[href]",
    company: Some(".base-search-card__subtitle, .company-name, h4"),
    location: Some(r#".job-search-card__location, .base-search-card__metadata, [class*="location"]"#),
    salary: None,
    strip_query: true,
    require_host: Some("linkedin.com"),
    max_cards: 10,
};

pub const ONLINEJOBS_CARDS: CardSpec = CardSpec {
    cards: &[r#"div[class*="jobpost"], div[class*="job-post"], div[class*="job_post"], div[class*="job-row"]"#],
    title: "a[href]",
    link: "a[href]",
    company: Some(r#"[class*="company"], [class*="employer"], [class*="client"]"#),
    location: None,
    salary: Some(r#"[class*="rate"], [class*="salary"], [class*="pay"]"#),
    strip_query: false,
    require_host: None,
    max_cards: 12,
};

pub const TRABAHO_CARDS: CardSpec = CardSpec {
    cards: &[r#"div[class*="job-item"], div[class*="job-listing"], div[class*="jobitem"], div[class*="vacancy"]"#],
    title: "h2, h3, a",
    link: "a[href]",
    company: Some(r#"[class*="company"], [class*="employer"]"#),
    location: Some(r#"[class*="location"], [class*="city"]"#),
    salary: None,
    strip_query: false,
    require_host: None,
    max_cards: 10,
};

const JOBSTREET_NEXT_DATA: NextDataSpec = NextDataSpec {
    jobs_pointer: "/props/pageProps/jobSearchResult/jobs",
    link_template: "https://www.jobstreet.com.ph/job/{id}",
};

fn with_query(base: &str, params: &[(&str, &str)]) -> Result<String> {
    Ok(Url::parse_with_params(base, params)
        .with_context(|| format!("building url from {base}"))?
        .to_string())
}

fn gets<I>(urls: I, accept: Option<&'static str>) -> Result<Vec<PageRequest>>
where
    I: IntoIterator<Item = Result<String>>,
{
    urls.into_iter()
        .map(|u| {
            u.map(|url| match accept {
                Some(a) => PageRequest::get_accepting(url, a),
                None => PageRequest::get(url),
            })
        })
        .collect()
}

fn base(url: &str) -> Result<Option<Url>> {
    Ok(Some(Url::parse(url).with_context(|| format!("base url {url}"))?))
}

/// Build the ten production adapters, all sharing one HTTP client.
///
/// Jooble uses its JSON API when `jooble_api_key` is configured and falls
/// back to scraping its public search pages otherwise.
pub fn default_catalog(cfg: &AppConfig, fetcher: Arc<HttpFetcher>) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let http = |requests: Vec<PageRequest>, delay: Duration| PageSource::http(fetcher.clone(), requests, delay);
    let mut out: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(10);

    // 1. Indeed PH
    let feeds = gets(
        INDEED_TERMS.into_iter().map(|t| {
            with_query(
                "https://ph.indeed.com/rss",
                &[("q", t), ("l", "Philippines"), ("sort", "date"), ("limit", "25")],
            )
        }),
        Some(ACCEPT_XML),
    )?;
    out.push(Arc::new(RssSource::new(
        "Indeed PH",
        http(feeds, PAGE_DELAY),
        RssOptions::default(),
    )));

    // 2. RemoteOK
    out.push(Arc::new(
        JsonApiSource::new(
            "RemoteOK",
            ApiShape::RemoteOk,
            http(vec![PageRequest::get_accepting("https://remoteok.com/api", ACCEPT_JSON)], Duration::ZERO),
        )
        .with_location("Remote (Worldwide)"),
    ));

    // 3. Jooble
    out.push(match cfg.jooble_api_key.as_deref() {
        Some(key) => {
            let requests = JOOBLE_TERMS
                .into_iter()
                .map(|t| PageRequest::PostJson {
                    url: format!("https://jooble.org/api/{key}"),
                    body: json!({ "keywords": t, "location": "Philippines", "page": 1 }),
                })
                .collect();
            Arc::new(JsonApiSource::new("Jooble", ApiShape::Jooble, http(requests, PAGE_DELAY))) as Arc<dyn SourceAdapter>
        }
        None => {
            tracing::info!(target: "sources", "JOOBLE_API_KEY not set; Jooble falls back to HTML scraping");
            let pages = gets(
                JOOBLE_TERMS
                    .into_iter()
                    .map(|t| with_query("https://ph.jooble.org/SearchResult", &[("ukw", t)])),
                None,
            )?;
            Arc::new(HtmlSource::new(
                "Jooble",
                http(pages, PAGE_DELAY),
                base("https://ph.jooble.org/")?,
                CardSelectors::compile(&JOOBLE_CARDS)?,
            ))
        }
    });

    // 4. PhilJobNet
    let feeds = gets(
        ["https://www.philjobnet.gov.ph/rss/jobs", "https://www.philjobnet.gov.ph/rss/latest"]
            .into_iter()
            .map(|u| Ok(u.to_string())),
        Some(ACCEPT_XML),
    )?;
    out.push(Arc::new(RssSource::new(
        "PhilJobNet",
        http(feeds, PAGE_DELAY),
        RssOptions {
            fields_from_description: true,
            ..RssOptions::default()
        },
    )));

    // 5. LinkedIn
    let pages = gets(
        LINKEDIN_TERMS.into_iter().map(|t| {
            with_query(
                "https://www.linkedin.com/jobs/search",
                &[
                    ("keywords", t),
                    ("location", "Philippines"),
                    ("f_TPR", "r86400"),
                    ("sortBy", "DD"),
                ],
            )
        }),
        None,
    )?;
    out.push(Arc::new(
        StructuredHtmlSource::new(
            "LinkedIn",
            http(pages, LINKEDIN_PAGE_DELAY),
            base("https://www.linkedin.com/")?,
        )
        .with_cards(CardSelectors::compile(&LINKEDIN_CARDS)?),
    ));

    // 6. JobStreet PH
    let pages = gets(
        JOBSTREET_PAGES
            .into_iter()
            .map(|p| Ok(format!("https://www.jobstreet.com.ph/{p}"))),
        None,
    )?;
    out.push(Arc::new(
        StructuredHtmlSource::new(
            "JobStreet PH",
            http(pages, PAGE_DELAY),
            base("https://www.jobstreet.com.ph/")?,
        )
        .with_next_data(JOBSTREET_NEXT_DATA),
    ));

    // 7. OnlineJobs.ph
    let pages = gets(
        ONLINEJOBS_TERMS.into_iter().map(|t| {
            with_query(
                "https://www.onlinejobs.ph/jobseekers/joblist/1",
                &[("keyword", t), ("jobtype", "1"), ("category", "0")],
            )
        }),
        None,
    )?;
    out.push(Arc::new(
        StructuredHtmlSource::new(
            "OnlineJobs.ph",
            http(pages, PAGE_DELAY),
            base("https://www.onlinejobs.ph/")?,
        )
        .with_cards(CardSelectors::compile(&ONLINEJOBS_CARDS)?)
        .with_defaults(Some("Philippines (Remote)"), Some("Remote Employer")),
    ));

    // 8. Kalibrr
    let pages = gets(
        KALIBRR_TERMS.into_iter().map(|t| {
            with_query(
                "https://www.kalibrr.com/job-board/te/philippines",
                &[("q", t), ("sort", "recent")],
            )
        }),
        None,
    )?;
    out.push(Arc::new(StructuredHtmlSource::new(
        "Kalibrr",
        http(pages, PAGE_DELAY),
        base("https://www.kalibrr.com/")?,
    )));

    // 9. BossJob PH
    let pages = gets(
        BOSSJOB_TERMS
            .into_iter()
            .map(|t| with_query("https://ph.bossjob.com/jobs", &[("search", t), ("sort", "latest")])),
        None,
    )?;
    out.push(Arc::new(StructuredHtmlSource::new(
        "BossJob PH",
        http(pages, PAGE_DELAY),
        base("https://ph.bossjob.com/")?,
    )));

    // 10. Trabaho.ph
    let pages = gets(
        TRABAHO_TERMS
            .into_iter()
            .map(|t| with_query("https://trabaho.ph/jobs", &[("q", t), ("sort", "newest")])),
        None,
    )?;
    out.push(Arc::new(
        StructuredHtmlSource::new("Trabaho.ph", http(pages, PAGE_DELAY), base("https://trabaho.ph/")?)
            .with_cards(CardSelectors::compile(&TRABAHO_CARDS)?),
    ));

    Ok(out)
}
