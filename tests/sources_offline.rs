// tests/sources_offline.rs
//
// Every parsing strategy driven from canned pages, then through the
// normalizer, the way a cycle would see them.

use chrono::{TimeZone, Utc};
use url::Url;

use jobfeed::model::{Category, Posting, RawCandidate};
use jobfeed::normalize::Normalizer;
use jobfeed::sources::catalog::{JOOBLE_CARDS, ONLINEJOBS_CARDS};
use jobfeed::sources::html::{CardSelectors, HtmlSource};
use jobfeed::sources::json_api::{ApiShape, JsonApiSource};
use jobfeed::sources::rss::{RssOptions, RssSource};
use jobfeed::sources::structured::{NextDataSpec, StructuredHtmlSource};
use jobfeed::sources::{SourceAdapter, Strategy};

const INDEED: &str = include_str!("fixtures/indeed_rss.xml");
const PHILJOBNET: &str = include_str!("fixtures/philjobnet_rss.xml");
const REMOTEOK: &str = include_str!("fixtures/remoteok.json");
const KALIBRR: &str = include_str!("fixtures/kalibrr_jsonld.html");
const JOBSTREET: &str = include_str!("fixtures/jobstreet_next_data.html");
const ONLINEJOBS: &str = include_str!("fixtures/onlinejobs_cards.html");
const JOOBLE: &str = include_str!("fixtures/jooble_search.html");

fn normalize(source: &str, raw: &[RawCandidate]) -> (Vec<Posting>, usize) {
    let now = Utc.with_ymd_and_hms(2025, 3, 3, 12, 0, 0).unwrap();
    Normalizer::default().normalize_all(raw.iter().map(|c| (source, c)), now)
}

#[tokio::test]
async fn indeed_feed_reads_namespaced_fields() {
    let src = RssSource::from_fixture("Indeed PH", INDEED);
    assert_eq!(src.strategy(), Strategy::Rss);

    let raw = src.fetch(25).await.expect("fixture feed parses");
    assert_eq!(raw.len(), 3);

    let (postings, dropped) = normalize(src.name(), &raw);
    assert_eq!(dropped, 1, "item without a link is dropped");

    let csr = &postings[0];
    assert_eq!(csr.fingerprint, "Indeed PH:a1b2c3d4e5");
    assert_eq!(csr.company, "Concentrix");
    assert_eq!(csr.location, "Quezon City, Metro Manila");
    assert_eq!(csr.salary_range.as_deref(), Some("₱22,000 - ₱28,000 a month"));
    assert_eq!(csr.category, Category::CallCenter);
    assert_eq!(
        csr.posted_at,
        Some(Utc.with_ymd_and_hms(2025, 3, 3, 2, 15, 0).unwrap())
    );

    let coder = &postings[1];
    assert_eq!(coder.location, "Cebu City");
    assert_eq!(coder.salary_range.as_deref(), Some("PHP 30,000 monthly"));
}

#[tokio::test]
async fn philjobnet_fields_come_from_description() {
    let src = RssSource::from_fixture("PhilJobNet", PHILJOBNET).with_options(RssOptions {
        fields_from_description: true,
        ..RssOptions::default()
    });
    let raw = src.fetch(25).await.unwrap();
    let (postings, _) = normalize(src.name(), &raw);

    assert_eq!(postings[0].company, "Mega Builders Inc.");
    assert_eq!(postings[0].location, "Makati City");
    assert_eq!(postings[0].category, Category::Accounting);
    assert_eq!(postings[1].company, "St. Luke's Medical Center");
    assert_eq!(postings[1].location, "Taguig");
}

#[tokio::test]
async fn remoteok_skips_legal_notice_and_renders_salary() {
    let src = JsonApiSource::from_fixture("RemoteOK", ApiShape::RemoteOk, REMOTEOK).with_location("Remote (Worldwide)");
    let raw = src.fetch(25).await.unwrap();
    assert_eq!(raw.len(), 3);

    let (postings, dropped) = normalize(src.name(), &raw);
    assert_eq!(dropped, 1);
    assert_eq!(postings[0].fingerprint, "RemoteOK:1093021");
    assert_eq!(postings[0].salary_range.as_deref(), Some("$30,000–$45,000/yr"));
    assert_eq!(postings[0].location, "Remote (Worldwide)");
    assert_eq!(postings[1].salary_range.as_deref(), Some("$90,000+/yr"));
    assert_eq!(postings[1].category, Category::ItTech);
}

#[tokio::test]
async fn kalibrr_json_ld_postings() {
    let base = Url::parse("https://www.kalibrr.com/job-board").unwrap();
    let src = StructuredHtmlSource::from_fixture("Kalibrr", KALIBRR, Some(base));
    assert_eq!(src.strategy(), Strategy::StructuredHtml);

    let raw = src.fetch(25).await.unwrap();
    let (postings, dropped) = normalize(src.name(), &raw);
    assert_eq!(dropped, 0);
    assert_eq!(postings.len(), 2);

    let tsr = &postings[0];
    assert_eq!(tsr.fingerprint, "Kalibrr:221904");
    assert_eq!(
        tsr.url,
        "https://www.kalibrr.com/c/taskus/jobs/221904/technical-support-representative"
    );
    assert_eq!(tsr.company, "TaskUs");
    assert_eq!(tsr.location, "Taguig");
    assert_eq!(tsr.salary_range.as_deref(), Some("PHP 24,000–30,000"));

    let va = &postings[1];
    assert_eq!(va.company, "Ayala Land Premier");
    assert_eq!(va.location, "Makati");
    assert_eq!(va.salary_range.as_deref(), Some("PHP 20,000+"));
    assert_eq!(va.category, Category::VirtualAssistant);
}

#[tokio::test]
async fn jobstreet_next_data_builds_links_from_ids() {
    let src = StructuredHtmlSource::from_fixture("JobStreet PH", JOBSTREET, None).with_next_data(NextDataSpec {
        jobs_pointer: "/props/pageProps/jobSearchResult/jobs",
        link_template: "https://www.jobstreet.com.ph/job/{id}",
    });
    let raw = src.fetch(25).await.unwrap();
    let (postings, _) = normalize(src.name(), &raw);

    assert_eq!(postings.len(), 2);
    assert_eq!(postings[0].url, "https://www.jobstreet.com.ph/job/81234567");
    assert_eq!(postings[0].location, "Pasig City, Metro Manila");
    assert_eq!(postings[1].title, "Payroll Accountant");
    assert_eq!(postings[1].company, "SGV & Co.");
    assert_eq!(postings[1].location, "Makati City");
}

#[tokio::test]
async fn onlinejobs_card_fallback_with_defaults() {
    let cards = CardSelectors::compile(&ONLINEJOBS_CARDS).unwrap();
    let base = Url::parse("https://www.onlinejobs.ph/jobseekers/jobsearch").unwrap();
    let src = StructuredHtmlSource::from_fixture("OnlineJobs.ph", ONLINEJOBS, Some(base))
        .with_cards(cards)
        .with_defaults(Some("Philippines (Remote)"), Some("Remote Employer"));

    let raw = src.fetch(25).await.unwrap();
    let (postings, _) = normalize(src.name(), &raw);
    assert_eq!(postings.len(), 2);
    assert_eq!(
        postings[0].url,
        "https://www.onlinejobs.ph/jobseekers/job/Executive-Virtual-Assistant-1204411"
    );
    assert_eq!(postings[0].company, "Brightline Consulting");
    assert_eq!(postings[0].salary_range.as_deref(), Some("$800/month"));
    assert_eq!(postings[1].company, "Remote Employer");
    assert!(postings.iter().all(|p| p.location == "Philippines (Remote)"));
}

#[tokio::test]
async fn jooble_scrape_fallback_reads_article_cards() {
    let cards = CardSelectors::compile(&JOOBLE_CARDS).unwrap();
    let base = Url::parse("https://ph.jooble.org/SearchResult").unwrap();
    let src = HtmlSource::from_fixture("Jooble", JOOBLE, Some(base), cards);
    assert_eq!(src.strategy(), Strategy::Html);

    let raw = src.fetch(25).await.unwrap();
    let (postings, _) = normalize(src.name(), &raw);
    assert_eq!(postings.len(), 2);
    assert_eq!(
        postings[0].url,
        "https://ph.jooble.org/desc/-4471234567890?ckey=call+center"
    );
    assert_eq!(postings[0].company, "Alorica");
    assert_eq!(postings[0].location, "Davao City");
    assert_eq!(postings[1].company, "Globe Telecom");
    assert_eq!(postings[1].location, "Philippines");
    assert_eq!(postings[1].category, Category::SalesMarketing);
}

#[tokio::test]
async fn fetch_limit_truncates() {
    let src = RssSource::from_fixture("Indeed PH", INDEED);
    assert_eq!(src.fetch(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_shape_is_a_parse_error() {
    let src = StructuredHtmlSource::from_fixture("Kalibrr", "<html><body>maintenance</body></html>", None);
    let err = src.fetch(25).await.unwrap_err();
    assert_eq!(err.kind, jobfeed::ErrorKind::SourceParseError);

    let rss = RssSource::from_fixture("Indeed PH", REMOTEOK);
    assert!(rss.fetch(25).await.is_err());
}
