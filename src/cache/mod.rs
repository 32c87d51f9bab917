//! Cache module for storing fetched posts in memory
//!
//! This module provides the store the refresh policy writes fetched posts into,
//! keyed by the requested limit. Entries carry the time of their last refresh so
//! the policy can decide when they have gone stale. Nothing is persisted; the
//! cache starts empty on every run.

mod store;

pub use store::{CacheEntry, CacheStore};
