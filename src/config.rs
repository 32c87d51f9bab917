//! Runtime configuration loaded from the environment
//!
//! The upstream instance and access token are required; the server refuses to
//! start without them. Everything else has a default.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::refresh::RefreshConfig;
use crate::server::ServerConfig;

/// Base URL of the Mastodon instance, e.g. `https://mastodon.social`
pub const ENV_INSTANCE: &str = "MASTODON_INSTANCE";
/// Bearer token of the account whose posts are served
pub const ENV_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
/// Seconds before cached posts are considered stale
pub const ENV_UPDATE_INTERVAL: &str = "CACHE_UPDATE_INTERVAL";
/// Seconds before an upstream fetch is abandoned
pub const ENV_UPSTREAM_TIMEOUT: &str = "UPSTREAM_TIMEOUT";
pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";

/// Errors raised while assembling the configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("{0} is not set")]
    Missing(&'static str),

    /// A variable is set but cannot be used
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The HTTP client for upstream requests could not be set up
    #[error("failed to initialize the HTTP client: {0}")]
    HttpClient(String),
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Where to fetch posts from
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Base URL of the Mastodon instance
    pub instance: String,
    /// Bearer token sent with every upstream request
    pub access_token: String,
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("instance", &self.instance)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Complete configuration of a running proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub refresh: RefreshConfig,
}

impl Config {
    /// Reads the configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup
    ///
    /// Empty values are treated the same as unset ones.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable by name, or `None` if unset
    ///
    /// # Returns
    /// * `Ok(Config)` with defaults filled in for optional settings
    /// * `Err(ConfigError::Missing)` if the instance or access token is absent
    /// * `Err(ConfigError::Invalid)` if a numeric setting cannot be parsed
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let instance = get(ENV_INSTANCE).ok_or(ConfigError::Missing(ENV_INSTANCE))?;
        let access_token = get(ENV_ACCESS_TOKEN).ok_or(ConfigError::Missing(ENV_ACCESS_TOKEN))?;

        let mut refresh = RefreshConfig::default();
        if let Some(raw) = get(ENV_UPDATE_INTERVAL) {
            refresh.update_interval = parse_seconds(ENV_UPDATE_INTERVAL, &raw)?;
        }
        if let Some(raw) = get(ENV_UPSTREAM_TIMEOUT) {
            refresh.upstream_timeout = parse_timeout(ENV_UPSTREAM_TIMEOUT, &raw)?;
        }

        let mut server = ServerConfig::default();
        if let Some(host) = get(ENV_HOST) {
            server.host = host;
        }
        if let Some(raw) = get(ENV_PORT) {
            server.port = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(ENV_PORT, raw.as_str(), format!("{e}")))?;
        }

        Ok(Self {
            server,
            upstream: UpstreamConfig {
                instance: instance.trim().to_string(),
                access_token: access_token.trim().to_string(),
            },
            refresh,
        })
    }
}

/// Parses a whole number of seconds
pub(crate) fn parse_seconds(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::invalid(name, raw, format!("expected whole seconds ({e})")))
}

/// Parses a timeout in seconds, which must be non-zero
pub(crate) fn parse_timeout(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let timeout = parse_seconds(name, raw)?;
    if timeout.is_zero() {
        return Err(ConfigError::invalid(name, raw, "must be at least one second"));
    }
    Ok(timeout)
}
