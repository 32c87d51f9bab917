//! Integration test: HTTP endpoints backed by a fake upstream

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use tootcache::data::{Status, StatusSource, UpstreamError};
use tootcache::refresh::{RefreshConfig, RefreshPolicy};
use tootcache::server::{create_router, AppState, REFRESHED_AT_HEADER};

/// Upstream stand-in that records every fetch
#[derive(Default)]
struct FakeUpstream {
    fetches: AtomicUsize,
    limits: Mutex<Vec<u32>>,
    failing: AtomicBool,
}

impl FakeUpstream {
    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl StatusSource for FakeUpstream {
    async fn fetch_statuses(&self, limit: u32) -> Result<Vec<Status>, UpstreamError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst);
        self.limits.lock().unwrap().push(limit);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Fetch {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "upstream exploded".to_string(),
            });
        }
        Ok((0..limit)
            .map(|i| json!({ "id": format!("{n}-{i}"), "content": "<p>hello</p>" }))
            .collect())
    }
}

fn test_app(upstream: Arc<FakeUpstream>) -> Router {
    let policy = RefreshPolicy::new(upstream, RefreshConfig::default());
    create_router(Arc::new(AppState::new(policy)))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test(start_paused = true)]
async fn test_statuses_default_limit() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (status, body) = get(&app, "/statuses").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(3));
    assert_eq!(*upstream.limits.lock().unwrap(), vec![3]);
}

#[tokio::test(start_paused = true)]
async fn test_statuses_are_served_from_cache_within_interval() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (_, first) = get(&app, "/statuses?limit=3").await;
    tokio::time::advance(Duration::from_secs(1800)).await;
    let (status, second) = get(&app, "/statuses?limit=3").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(upstream.fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_statuses_refetched_after_interval() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (_, first) = get(&app, "/statuses?limit=3").await;
    tokio::time::advance(Duration::from_secs(3601)).await;
    let (status, second) = get(&app, "/statuses?limit=3").await;

    assert_eq!(status, StatusCode::OK);
    assert_ne!(first, second);
    assert_eq!(upstream.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_each_limit_has_its_own_entry() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (_, three) = get(&app, "/statuses?limit=3").await;
    let (_, five) = get(&app, "/statuses?limit=5").await;

    assert_eq!(three.as_array().map(Vec::len), Some(3));
    assert_eq!(five.as_array().map(Vec::len), Some(5));
    assert_eq!(upstream.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_statuses_limit_too_large() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (status, body) = get(&app, "/statuses?limit=11").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Limit cannot exceed 10" }));
    assert_eq!(upstream.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_webhook_limit_too_large() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (status, body) = get(&app, "/webhook?limit=50").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Limit cannot exceed 10" }));
    assert_eq!(upstream.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_zero_limit_is_rejected() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (status, body) = get(&app, "/statuses?limit=0").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Limit must be at least 1" }));
    assert_eq!(upstream.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_statuses_upstream_failure() {
    let upstream = Arc::new(FakeUpstream::default());
    upstream.set_failing(true);
    let app = test_app(upstream.clone());

    let (status, body) = get(&app, "/statuses").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Unable to fetch latest posts" }));
}

#[tokio::test(start_paused = true)]
async fn test_webhook_always_refetches() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    get(&app, "/statuses?limit=3").await;
    let (status, body) = get(&app, "/webhook?limit=3").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Cache updated successfully" }));
    assert_eq!(upstream.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_webhook_refresh_is_served_by_statuses() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (_, before) = get(&app, "/statuses?limit=2").await;
    get(&app, "/webhook?limit=2").await;
    let (_, after) = get(&app, "/statuses?limit=2").await;

    assert_ne!(before, after);
    assert_eq!(upstream.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_webhook_failure_keeps_cached_posts() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (_, cached) = get(&app, "/statuses?limit=3").await;
    upstream.set_failing(true);

    let (status, body) = get(&app, "/webhook?limit=3").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Failed to update cache" }));

    let (status, still_cached) = get(&app, "/statuses?limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(still_cached, cached);
    assert_eq!(upstream.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_statuses_response_headers() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/statuses")
                .header(header::ORIGIN, "https://blog.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
    assert!(response.headers().contains_key(REFRESHED_AT_HEADER));
}

#[tokio::test(start_paused = true)]
async fn test_health_reports_cached_keys() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream);

    get(&app, "/statuses?limit=1").await;
    get(&app, "/statuses?limit=4").await;
    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "cached_keys": 2 }));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_limit_uses_first_value() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = test_app(upstream.clone());

    let (status, body) = get(&app, "/statuses?limit=3&limit=4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(3));

    let (status, body) = get(&app, "/webhook?limit=2&limit=20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Cache updated successfully" }));

    assert_eq!(*upstream.limits.lock().unwrap(), vec![3, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_route_is_not_found() {
    let app = test_app(Arc::new(FakeUpstream::default()));

    let (status, body) = get(&app, "/timeline").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "Not found" }));
}
