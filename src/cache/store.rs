//! In-memory store of fetched posts
//!
//! Provides a `CacheStore` mapping each requested limit to the posts last
//! fetched for it, along with when that fetch happened.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::data::Status;

/// Posts cached for one limit
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached posts, in upstream order
    pub results: Arc<Vec<Status>>,
    /// When the entry was last refreshed, on the monotonic clock
    pub refreshed_at: Instant,
    /// When the entry was last refreshed, as wall-clock time
    pub refreshed_at_utc: DateTime<Utc>,
}

impl CacheEntry {
    /// Time elapsed since the last refresh
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.refreshed_at)
    }

    /// Whether the entry is older than `interval`
    ///
    /// An entry exactly `interval` old is still fresh.
    pub fn is_stale(&self, now: Instant, interval: Duration) -> bool {
        self.age(now) > interval
    }
}

/// Shared map from limit to cached posts
///
/// Entries are created on the first successful fetch for a limit and then only
/// ever overwritten. An entry's refresh time never moves backwards.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<u32, CacheEntry>>,
}

impl CacheStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `limit`, if one has ever been stored
    pub async fn get(&self, limit: u32) -> Option<CacheEntry> {
        self.entries.read().await.get(&limit).cloned()
    }

    /// Whether `limit` has an entry that is not older than `interval`
    ///
    /// A limit with no entry is never fresh.
    pub async fn is_fresh(&self, limit: u32, now: Instant, interval: Duration) -> bool {
        self.entries
            .read()
            .await
            .get(&limit)
            .is_some_and(|entry| !entry.is_stale(now, interval))
    }

    /// Stores freshly fetched posts for `limit`, replacing any previous entry
    ///
    /// Returns the entry as stored.
    pub async fn insert(&self, limit: u32, results: Vec<Status>, now: Instant) -> CacheEntry {
        let mut entries = self.entries.write().await;

        let refreshed_at = match entries.get(&limit) {
            Some(previous) if previous.refreshed_at > now => previous.refreshed_at,
            _ => now,
        };
        let entry = CacheEntry {
            results: Arc::new(results),
            refreshed_at,
            refreshed_at_utc: Utc::now(),
        };

        entries.insert(limit, entry.clone());
        entry
    }

    /// Number of limits with cached posts
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing has been cached yet
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
