//! tootcache library
//!
//! A caching proxy for the latest posts of a Mastodon account. The binary wires
//! these modules together; they are exposed for integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod refresh;
pub mod server;
