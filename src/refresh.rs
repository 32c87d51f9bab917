//! Cache refresh policy
//!
//! Decides when the cached posts for a limit must be refetched and performs the
//! refetch. At most one upstream fetch runs per limit at any time: callers that
//! arrive while one is in flight wait for it and share its outcome. The fetch
//! itself runs on a spawned task, so a caller going away does not cancel it for
//! the others.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore};
use crate::data::{Status, StatusSource, UpstreamError};

/// Configuration for cache refreshes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Age after which cached posts are refetched
    pub update_interval: Duration,
    /// Upper bound on a single upstream fetch
    pub upstream_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(3600), // 1 hour
            upstream_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a refresh did not update the cache
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// The upstream source returned an error
    #[error("upstream fetch failed: {0}")]
    Upstream(Arc<UpstreamError>),

    /// The upstream source did not answer in time
    #[error("upstream fetch timed out after {0:?}")]
    TimedOut(Duration),

    /// The fetch task panicked or was cancelled
    #[error("refresh task did not complete: {0}")]
    TaskFailed(String),

    /// The refresh succeeded but no entry was found afterwards
    #[error("no cached posts for limit {0}")]
    Missing(u32),
}

type SharedRefresh = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

/// Fetch currently running for one limit
struct InFlight {
    refresh: SharedRefresh,
    /// Fetch queued by forced callers that arrived after `refresh` started
    follow_up: Option<SharedRefresh>,
}

struct Inner {
    source: Arc<dyn StatusSource>,
    store: CacheStore,
    config: RefreshConfig,
    in_flight: Mutex<HashMap<u32, InFlight>>,
}

/// Owns the cache and keeps it fresh
///
/// Cloning is cheap; clones share the same cache and in-flight fetches.
#[derive(Clone)]
pub struct RefreshPolicy {
    inner: Arc<Inner>,
}

impl RefreshPolicy {
    /// Creates a policy with an empty cache that fetches from `source`
    pub fn new(source: Arc<dyn StatusSource>, config: RefreshConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                store: CacheStore::new(),
                config,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &RefreshConfig {
        &self.inner.config
    }

    /// The cache this policy maintains
    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    /// Makes sure the cache entry for `limit` is fresh
    ///
    /// Fetches from upstream when `force` is set, when there is no entry yet, or
    /// when the entry is older than the update interval. On failure the existing
    /// entry, if any, is left untouched.
    ///
    /// A non-forced call that finds a fetch already running waits for it. A
    /// forced call in that situation waits for it and then for one more fetch,
    /// shared by every forced call that arrived while the first was running.
    ///
    /// # Arguments
    /// * `limit` - The cache key: how many of the latest posts to keep
    /// * `force` - Fetch even if the cached entry is still fresh
    ///
    /// # Returns
    /// * `Ok(())` if the entry is fresh or was just refreshed
    /// * `Err(RefreshError)` if the fetch failed or timed out
    pub async fn ensure_fresh(&self, limit: u32, force: bool) -> Result<(), RefreshError> {
        if !force && self.is_fresh(limit).await {
            debug!(limit, "Cache entry is fresh");
            return Ok(());
        }

        let refresh = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get_mut(&limit) {
                Some(pending) if force => {
                    debug!(limit, "Queueing follow-up refresh behind in-flight fetch");
                    let running = pending.refresh.clone();
                    pending
                        .follow_up
                        .get_or_insert_with(|| spawn_follow_up(Arc::clone(&self.inner), limit, running))
                        .clone()
                }
                Some(pending) => {
                    debug!(limit, "Joining in-flight refresh");
                    pending.refresh.clone()
                }
                None => {
                    // Another caller may have finished a refresh since the check above
                    if !force && self.is_fresh(limit).await {
                        return Ok(());
                    }
                    start_refresh(&self.inner, limit, &mut in_flight)
                }
            }
        };

        refresh.await
    }

    /// Returns the cached posts for `limit`, refreshing them first if stale
    pub async fn statuses(&self, limit: u32) -> Result<CacheEntry, RefreshError> {
        self.ensure_fresh(limit, false).await?;
        self.inner
            .store
            .get(limit)
            .await
            .ok_or(RefreshError::Missing(limit))
    }

    async fn is_fresh(&self, limit: u32) -> bool {
        self.inner
            .store
            .is_fresh(limit, Instant::now(), self.inner.config.update_interval)
            .await
    }
}

/// Starts a fetch for `limit` on its own task and registers it as in flight
///
/// The task stores the result and removes itself from the in-flight map while
/// holding the map's lock, so no caller can observe a finished refresh that is
/// neither in the map nor in the cache.
fn start_refresh(inner: &Arc<Inner>, limit: u32, in_flight: &mut HashMap<u32, InFlight>) -> SharedRefresh {
    let task_inner = Arc::clone(inner);
    let task = tokio::spawn(async move {
        let inner = task_inner;
        let started = Instant::now();
        let outcome = inner.fetch(limit).await;

        let mut in_flight = inner.in_flight.lock().await;
        let result = match outcome {
            Ok(results) => {
                let count = results.len();
                inner.store.insert(limit, results, started).await;
                info!(
                    limit,
                    count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Cache refreshed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(limit, error = %e, "Cache refresh failed, keeping existing entry");
                Err(e)
            }
        };
        in_flight.remove(&limit);
        result
    });

    let refresh = share(task);
    in_flight.insert(
        limit,
        InFlight {
            refresh: refresh.clone(),
            follow_up: None,
        },
    );
    refresh
}

/// Runs one more fetch for `limit` once `running` has finished
///
/// If some other caller has already started a new fetch by then, that one is
/// joined instead; it began after the forced callers arrived.
fn spawn_follow_up(inner: Arc<Inner>, limit: u32, running: SharedRefresh) -> SharedRefresh {
    let task = tokio::spawn(async move {
        // Its outcome is irrelevant, it started too early
        let _ = running.await;

        let refresh = {
            let mut in_flight = inner.in_flight.lock().await;
            match in_flight.get(&limit) {
                Some(pending) => pending.refresh.clone(),
                None => start_refresh(&inner, limit, &mut in_flight),
            }
        };
        refresh.await
    });

    share(task)
}

/// Lets any number of callers await a spawned refresh
fn share(task: JoinHandle<Result<(), RefreshError>>) -> SharedRefresh {
    async move {
        match task.await {
            Ok(result) => result,
            Err(e) => Err(RefreshError::TaskFailed(e.to_string())),
        }
    }
    .boxed()
    .shared()
}

impl Inner {
    /// Fetches from the source, bounded by the upstream timeout
    async fn fetch(&self, limit: u32) -> Result<Vec<Status>, RefreshError> {
        let timeout = self.config.upstream_timeout;
        let fetch = AssertUnwindSafe(self.source.fetch_statuses(limit)).catch_unwind();

        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(Ok(results))) => Ok(results),
            Ok(Ok(Err(e))) => Err(RefreshError::Upstream(Arc::new(e))),
            Ok(Err(_)) => Err(RefreshError::TaskFailed("upstream source panicked".to_string())),
            Err(_) => Err(RefreshError::TimedOut(timeout)),
        }
    }
}
