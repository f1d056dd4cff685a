// tests/metrics.rs
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use jobfeed::metrics::{ensure_metrics_described, Metrics};

#[tokio::test]
async fn detached_handle_serves_exposition_text() {
    ensure_metrics_described();
    let app = Metrics::detached().router();

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // axum::body::to_bytes requires an explicit limit
    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    assert!(String::from_utf8(body.to_vec()).is_ok());
}

#[tokio::test]
async fn unknown_path_is_404() {
    let app = Metrics::detached().router();
    let resp = app
        .oneshot(Request::get("/metric").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
