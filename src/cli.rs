//! Command-line interface parsing for tootcache
//!
//! Every setting can come from the environment; the flags here override the
//! environment for a single run.

use clap::Parser;

use crate::config::{parse_timeout, Config, ConfigError};

/// tootcache - serve the latest posts of a Mastodon account from a local cache
///
/// The instance and account are taken from MASTODON_INSTANCE and ACCESS_TOKEN.
#[derive(Parser, Debug)]
#[command(name = "tootcache")]
#[command(about = "Caching proxy for the latest posts of a Mastodon account")]
#[command(version)]
pub struct Cli {
    /// Address to listen on [env: HOST, default: 0.0.0.0]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on [env: PORT, default: 5000]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Seconds before cached posts are refetched [env: CACHE_UPDATE_INTERVAL, default: 3600]
    #[arg(long, value_name = "SECONDS")]
    pub cache_interval: Option<u64>,

    /// Seconds before an upstream fetch is abandoned [env: UPSTREAM_TIMEOUT, default: 10]
    #[arg(long, value_name = "SECONDS")]
    pub upstream_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Loads the configuration from the environment and applies the flags on top
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        self.apply_to(Config::from_env()?)
    }

    /// Overrides the settings in `config` with the flags that were given
    pub fn apply_to(&self, mut config: Config) -> Result<Config, ConfigError> {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(secs) = self.cache_interval {
            config.refresh.update_interval = std::time::Duration::from_secs(secs);
        }
        if let Some(secs) = self.upstream_timeout {
            config.refresh.upstream_timeout = parse_timeout("--upstream-timeout", &secs.to_string())?;
        }
        Ok(config)
    }

    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "tootcache=debug,tower_http=debug"
        } else {
            "tootcache=info,tower_http=info"
        }
    }
}
