// src/api.rs

//! Operator HTTP surface over the service. Thin: every handler is one
//! service call plus status mapping.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::{CycleError, StorageError};
use crate::metrics::Metrics;
use crate::model::{CategoryFilter, ChatId, Posting, Subscriber};
use crate::service::{JobFeed, Stats};

pub const ADMIN_HEADER: &str = "x-admin-id";

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;

pub type AppState = Arc<JobFeed>;

pub fn create_router(feed: AppState, metrics: &Metrics) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/jobs", get(latest_jobs))
        .route("/stats", get(stats))
        .route("/subscribers/{chat_id}", get(get_subscription))
        .route("/subscribers/{chat_id}/subscribe", post(subscribe))
        .route("/subscribers/{chat_id}/unsubscribe", post(unsubscribe))
        .route("/subscribers/{chat_id}/filter", put(set_filter))
        .route("/admin/cycle", post(admin_cycle))
        .with_state(feed)
        .merge(metrics.router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        tracing::error!(error = %e, "storage failure in request");
        ApiError(StatusCode::INTERNAL_SERVER_ERROR, "storage error".into())
    }
}

impl From<CycleError> for ApiError {
    fn from(e: CycleError) -> Self {
        match e {
            CycleError::InProgress => ApiError(StatusCode::CONFLICT, e.to_string()),
            CycleError::Unauthorized(_) => ApiError(StatusCode::FORBIDDEN, e.to_string()),
            CycleError::Storage(se) => se.into(),
        }
    }
}

fn parse_filter(raw: Option<&str>) -> Result<CategoryFilter, ApiError> {
    match raw {
        None => Ok(CategoryFilter::All),
        Some(s) => s
            .parse()
            .map_err(|e| ApiError(StatusCode::BAD_REQUEST, format!("{e}"))),
    }
}

#[derive(Deserialize)]
struct JobsQuery {
    limit: Option<usize>,
    category: Option<String>,
}

async fn latest_jobs(State(feed): State<AppState>, Query(q): Query<JobsQuery>) -> Result<Json<Vec<Posting>>, ApiError> {
    let filter = parse_filter(q.category.as_deref())?;
    let n = q.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(feed.get_latest(n, filter)?))
}

async fn stats(State(feed): State<AppState>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(feed.get_stats()?))
}

async fn get_subscription(State(feed): State<AppState>, Path(chat_id): Path<ChatId>) -> Result<Json<Subscriber>, ApiError> {
    feed.get_subscription(chat_id)?
        .map(Json)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("chat {chat_id} is not registered")))
}

#[derive(Deserialize)]
struct SubscribeQuery {
    name: Option<String>,
}

async fn subscribe(
    State(feed): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Query(q): Query<SubscribeQuery>,
) -> Result<Json<Subscriber>, ApiError> {
    Ok(Json(feed.subscribe(chat_id, q.name.as_deref())?))
}

#[derive(Serialize)]
struct UnsubscribeResp {
    was_registered: bool,
}

async fn unsubscribe(State(feed): State<AppState>, Path(chat_id): Path<ChatId>) -> Result<Json<UnsubscribeResp>, ApiError> {
    Ok(Json(UnsubscribeResp {
        was_registered: feed.unsubscribe(chat_id)?,
    }))
}

#[derive(Deserialize)]
struct FilterReq {
    category: String,
}

async fn set_filter(
    State(feed): State<AppState>,
    Path(chat_id): Path<ChatId>,
    Json(body): Json<FilterReq>,
) -> Result<Json<Subscriber>, ApiError> {
    let filter = parse_filter(Some(&body.category))?;
    if !feed.set_filter(chat_id, filter)? {
        return Err(ApiError(StatusCode::NOT_FOUND, format!("chat {chat_id} is not registered")));
    }
    feed.get_subscription(chat_id)?
        .map(Json)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("chat {chat_id} is not registered")))
}

#[derive(Serialize)]
struct CycleResp {
    summary: String,
    new_postings: usize,
    sources_succeeded: usize,
    sources_failed: usize,
    dropped: usize,
}

async fn admin_cycle(State(feed): State<AppState>, headers: HeaderMap) -> Result<Json<CycleResp>, ApiError> {
    let identity = headers
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<i64>().ok());
    let res = feed.trigger_manual(identity).await?;
    Ok(Json(CycleResp {
        summary: res.summary(),
        new_postings: res.new_postings.len(),
        sources_succeeded: res.sources_succeeded(),
        sources_failed: res.sources_failed(),
        dropped: res.dropped,
    }))
}
