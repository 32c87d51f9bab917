//! HTTP server
//!
//! Serves the cached posts over `/statuses`, forced refreshes over `/webhook`
//! and a liveness check over `/health`.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ApiError;
pub use handlers::{parse_limit, DEFAULT_LIMIT, MAX_LIMIT, REFRESHED_AT_HEADER};
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::config::Config;
use crate::data::MastodonClient;
use crate::refresh::RefreshPolicy;

/// Where the server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl ServerConfig {
    /// Socket address built from host and port
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

/// Start the server with the given configuration
///
/// Runs until ctrl+c is received.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let client = MastodonClient::new(&config.upstream, config.refresh.upstream_timeout)
        .context("invalid upstream configuration")?;
    info!(
        instance = %client.base_url(),
        update_interval_secs = config.refresh.update_interval.as_secs(),
        upstream_timeout_secs = config.refresh.upstream_timeout.as_secs(),
        "Upstream configured"
    );

    let policy = RefreshPolicy::new(Arc::new(client), config.refresh.clone());
    let state = Arc::new(AppState::new(policy));
    let app = create_router(Arc::clone(&state));

    let addr = config.server.addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, pid = std::process::id(), "Server listening");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install ctrl+c handler, running until killed");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(state.started_at);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
