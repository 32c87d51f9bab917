//! Mastodon API client
//!
//! Fetches the latest posts of the account that owns the configured access
//! token. A fetch is two sequential calls: `verify_credentials` to resolve the
//! account id, then that account's `statuses` listing.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{Status, StatusSource};
use crate::config::{ConfigError, UpstreamConfig, ENV_ACCESS_TOKEN, ENV_INSTANCE};

/// Maximum number of bytes of an upstream error body kept for logging
const ERROR_BODY_LIMIT: usize = 512;

/// Errors that can occur when fetching posts from the upstream instance
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The instance rejected the access token
    #[error("credential verification failed with {status}: {body}")]
    Auth { status: StatusCode, body: String },

    /// The instance rejected the status listing request
    #[error("status listing failed with {status}: {body}")]
    Fetch { status: StatusCode, body: String },

    /// HTTP request failed or the response could not be decoded
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Subset of the account returned by `verify_credentials`
#[derive(Debug, Deserialize)]
struct Account {
    id: AccountId,
}

/// Mastodon sends ids as strings, but some compatible servers use numbers
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountId {
    Text(String),
    Number(u64),
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountId::Text(id) => f.write_str(id),
            AccountId::Number(id) => write!(f, "{id}"),
        }
    }
}

/// Client for the Mastodon accounts API
#[derive(Clone)]
pub struct MastodonClient {
    client: Client,
    base_url: Url,
    access_token: String,
}

impl fmt::Debug for MastodonClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MastodonClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl MastodonClient {
    /// Creates a client for the configured instance
    ///
    /// Fails without touching the network if the instance URL or access token
    /// is missing or unusable.
    ///
    /// # Arguments
    /// * `config` - Instance URL and access token
    /// * `timeout` - Upper bound on each HTTP request
    ///
    /// # Returns
    /// * `Ok(MastodonClient)` ready to fetch statuses
    /// * `Err(ConfigError::Missing)` / `Err(ConfigError::Invalid)` for bad settings
    /// * `Err(ConfigError::HttpClient)` if the HTTP client cannot be built
    pub fn new(config: &UpstreamConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Self::with_client(client, config)
    }

    /// Creates a client that sends its requests through `client`
    pub fn with_client(client: Client, config: &UpstreamConfig) -> Result<Self, ConfigError> {
        let access_token = config.access_token.trim();
        if access_token.is_empty() {
            return Err(ConfigError::Missing(ENV_ACCESS_TOKEN));
        }

        Ok(Self {
            client,
            base_url: parse_instance_url(&config.instance)?,
            access_token: access_token.to_string(),
        })
    }

    /// Base URL requests are made against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds an API URL by appending path segments to the instance URL
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // The base is validated as http(s), so it always has path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Resolves the id of the account owning the access token
    async fn verify_credentials(&self) -> Result<AccountId, UpstreamError> {
        let url = self.endpoint(&["api", "v1", "accounts", "verify_credentials"]);
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body) = error_parts(response).await;
            return Err(UpstreamError::Auth { status, body });
        }

        let account: Account = response.json().await?;
        Ok(account.id)
    }

    /// Lists the most recent posts of an account
    async fn list_statuses(&self, account_id: &AccountId, limit: u32) -> Result<Vec<Status>, UpstreamError> {
        let id = account_id.to_string();
        let url = self.endpoint(&["api", "v1", "accounts", &id, "statuses"]);
        let response = self
            .client
            .get(url)
            .query(&[("limit", limit)])
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, body) = error_parts(response).await;
            return Err(UpstreamError::Fetch { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl StatusSource for MastodonClient {
    async fn fetch_statuses(&self, limit: u32) -> Result<Vec<Status>, UpstreamError> {
        let account_id = self.verify_credentials().await?;
        debug!(account_id = %account_id, limit, "Verified upstream credentials");

        let statuses = self.list_statuses(&account_id, limit).await?;
        debug!(count = statuses.len(), limit, "Fetched upstream statuses");
        Ok(statuses)
    }
}

/// Validates the instance URL; it must be an absolute http(s) URL
fn parse_instance_url(instance: &str) -> Result<Url, ConfigError> {
    let instance = instance.trim();
    if instance.is_empty() {
        return Err(ConfigError::Missing(ENV_INSTANCE));
    }

    let url = Url::parse(instance).map_err(|e| ConfigError::invalid(ENV_INSTANCE, instance, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(ENV_INSTANCE, instance, "expected an http or https URL"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ConfigError::invalid(ENV_INSTANCE, instance, "must not have a query or fragment"));
    }

    Ok(url)
}

/// Extracts the status and a truncated body from a failed response
async fn error_parts(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let mut end = ERROR_BODY_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    (status, body)
}
