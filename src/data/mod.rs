//! Upstream data sources
//!
//! The refresh policy only knows about the `StatusSource` trait. The Mastodon
//! API client is the production implementation.

pub mod mastodon;

pub use mastodon::{MastodonClient, UpstreamError};

use async_trait::async_trait;

/// A single post as returned by the upstream API
///
/// Posts are served to clients exactly as received, so they are kept as raw JSON.
pub type Status = serde_json::Value;

/// A source of an account's most recent posts
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Fetches up to `limit` of the most recent posts, newest first
    async fn fetch_statuses(&self, limit: u32) -> Result<Vec<Status>, UpstreamError>;
}
