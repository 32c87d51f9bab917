//! API route definitions

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, state::AppState};

/// Create the application router
///
/// Every route allows cross-origin requests from any origin.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/statuses", get(handlers::get_statuses))
        .route("/webhook", get(handlers::trigger_refresh))
        .route("/health", get(handlers::health_check))
        .fallback(handlers::not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
