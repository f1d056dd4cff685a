// tests/sources_deadline.rs
//
// Multi-page sources against a loopback HTTP server where some pages never
// answer. Pages that arrived before the source deadline must survive it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use jobfeed::error::ErrorKind;
use jobfeed::sources::fetch_isolated;
use jobfeed::sources::http::{HttpFetcher, PageRequest, PageSource};
use jobfeed::sources::rss::{RssOptions, RssSource};

const INDEED: &str = include_str!("fixtures/indeed_rss.xml");

/// Serves the RSS fixture on `/good`; holds every other request open.
async fn spawn_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(serve(stream));
        }
    });
    format!("http://{addr}")
}

async fn serve(mut stream: TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    let head = String::from_utf8_lossy(&buf);
    if head.starts_with("GET /good ") {
        let resp = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/rss+xml\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            INDEED.len(),
            INDEED
        );
        let _ = stream.write_all(resp.as_bytes()).await;
        let _ = stream.shutdown().await;
    } else {
        // Keep the socket open and never answer.
        std::future::pending::<()>().await;
    }
}

fn rss_over(base: &str, paths: &[&str]) -> Arc<RssSource> {
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(30), vec!["jobfeed-test".into()]).unwrap());
    let requests = paths.iter().map(|p| PageRequest::get(format!("{base}{p}"))).collect();
    Arc::new(RssSource::new(
        "Indeed PH",
        PageSource::http(fetcher, requests, Duration::ZERO),
        RssOptions::default(),
    ))
}

#[tokio::test]
async fn pages_fetched_before_the_deadline_are_kept() {
    let base = spawn_server().await;
    let src = rss_over(&base, &["/good", "/slow1", "/slow2", "/slow3"]);

    let t0 = Instant::now();
    let out = fetch_isolated(src, 25, Duration::from_millis(800)).await;

    assert_eq!(out.error, None, "one good page is enough");
    assert_eq!(out.candidates.len(), 3);
    assert!(out.candidates.iter().any(|c| c.native_id.is_some()));
    assert!(t0.elapsed() < Duration::from_secs(5), "stalled pages cut at the deadline");
}

#[tokio::test]
async fn source_with_only_stalled_pages_is_unavailable() {
    let base = spawn_server().await;
    let src = rss_over(&base, &["/slow1", "/slow2"]);

    let out = fetch_isolated(src, 25, Duration::from_millis(500)).await;

    assert_eq!(out.error, Some(ErrorKind::SourceUnavailable));
    assert!(out.candidates.is_empty());
}
