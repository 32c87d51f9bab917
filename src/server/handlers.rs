//! HTTP request handlers

use std::num::IntErrorKind;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::HeaderName, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use tracing::debug;

use super::error::{ApiError, Result};
use super::state::AppState;

/// Number of posts served when the request does not say
pub const DEFAULT_LIMIT: u32 = 3;

/// Largest number of posts a client may request
pub const MAX_LIMIT: u32 = 10;

/// Response header carrying the time the served posts were fetched
pub const REFRESHED_AT_HEADER: HeaderName = HeaderName::from_static("x-cache-refreshed-at");

/// Query string as ordered key/value pairs
///
/// Kept as a list so a repeated `limit` resolves to its first value instead of
/// failing to deserialize.
pub type QueryPairs = Vec<(String, String)>;

/// First value of `limit` in the query string, if any
fn limit_param(params: &[(String, String)]) -> Option<&str> {
    params
        .iter()
        .find(|(key, _)| key == "limit")
        .map(|(_, value)| value.as_str())
}

/// Validates the `limit` query parameter
///
/// A missing or non-numeric value falls back to the default.
///
/// # Arguments
/// * `raw` - The `limit` value from the query string, if present
///
/// # Returns
/// * `Ok(u32)` - A limit between 1 and `MAX_LIMIT`
/// * `Err(ApiError::LimitTooLarge)` - If the value exceeds `MAX_LIMIT`
/// * `Err(ApiError::LimitTooSmall)` - If the value is zero or negative
pub fn parse_limit(raw: Option<&str>) -> Result<u32> {
    let limit = match raw.map(|s| s.trim().parse::<i64>()) {
        None => return Ok(DEFAULT_LIMIT),
        Some(Ok(limit)) => limit,
        Some(Err(e)) => match e.kind() {
            IntErrorKind::PosOverflow => return Err(ApiError::LimitTooLarge),
            IntErrorKind::NegOverflow => return Err(ApiError::LimitTooSmall),
            _ => return Ok(DEFAULT_LIMIT),
        },
    };

    if limit > i64::from(MAX_LIMIT) {
        return Err(ApiError::LimitTooLarge);
    }
    if limit < 1 {
        return Err(ApiError::LimitTooSmall);
    }
    Ok(limit as u32)
}

/// `GET /statuses`: serve the cached posts, refreshing them if stale
pub async fn get_statuses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Result<impl IntoResponse> {
    let limit = parse_limit(limit_param(&params))?;

    let entry = state
        .policy
        .statuses(limit)
        .await
        .map_err(ApiError::FetchFailed)?;
    debug!(limit, count = entry.results.len(), "Serving cached posts");

    let refreshed_at = HeaderValue::from_str(&entry.refreshed_at_utc.to_rfc3339()).ok();
    let mut response = Json(entry.results).into_response();
    if let Some(value) = refreshed_at {
        response.headers_mut().insert(REFRESHED_AT_HEADER, value);
    }
    Ok(response)
}

/// `GET /webhook`: refresh the cache now, regardless of its age
pub async fn trigger_refresh(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Result<impl IntoResponse> {
    let limit = parse_limit(limit_param(&params))?;

    state
        .policy
        .ensure_fresh(limit, true)
        .await
        .map_err(ApiError::RefreshFailed)?;

    Ok(Json(json!({ "message": "Cache updated successfully" })))
}

/// `GET /health`: liveness check
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "cached_keys": state.policy.store().len().await,
    }))
}

/// Fallback for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
