//! tootcache - serve the latest posts of a Mastodon account from a local cache
//!
//! Reads its configuration from the environment, then runs the HTTP server
//! until interrupted.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tootcache::cli::Cli;
use tootcache::server::run_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| cli.default_log_filter().into());
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Missing credentials abort startup instead of failing every request
    let config = cli.load_config().context("invalid configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    run_server(config).await
}
