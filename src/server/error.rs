//! Error types for the HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use super::handlers::MAX_LIMIT;
use crate::refresh::RefreshError;

/// Errors returned to HTTP clients
///
/// Upstream failures only ever reach clients as a fixed message; the detail is
/// logged here instead.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Limit cannot exceed {}", MAX_LIMIT)]
    LimitTooLarge,

    #[error("Limit must be at least 1")]
    LimitTooSmall,

    /// Reading posts failed because the cache could not be refreshed
    #[error("Unable to fetch latest posts")]
    FetchFailed(#[source] RefreshError),

    /// A forced refresh failed
    #[error("Failed to update cache")]
    RefreshFailed(#[source] RefreshError),

    #[error("Not found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::LimitTooLarge | ApiError::LimitTooSmall => StatusCode::BAD_REQUEST,
            ApiError::FetchFailed(_) | ApiError::RefreshFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::FetchFailed(e) => {
                tracing::error!(detail = %e, "Unable to serve cached posts");
            }
            ApiError::RefreshFailed(e) => {
                tracing::error!(detail = %e, "Forced cache refresh failed");
            }
            _ => {}
        }

        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
