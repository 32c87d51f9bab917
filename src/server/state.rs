//! Application state shared across handlers

use chrono::{DateTime, Utc};

use crate::refresh::RefreshPolicy;

/// Application state shared across handlers
pub struct AppState {
    /// Owns the post cache and decides when to refresh it
    pub policy: RefreshPolicy,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(policy: RefreshPolicy) -> Self {
        Self {
            policy,
            started_at: Utc::now(),
        }
    }
}
