//! Module fetching with bounded retry.
//!
//! [`Fetch`] is the transport seam: the production implementation is a
//! pooled `reqwest` client, and tests substitute scripted fetchers to pin
//! down the retry semantics without a network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use vellum_common::{BridgeError, FetchError, RetryConfig};

/// A transport capable of fetching module bytes from a URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetch the resource once. Retrying is the caller's concern.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

/// HTTP transport backed by a pooled `reqwest` client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with connection pooling and sane timeouts.
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("vellum/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Create with a custom HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!(url = %url, bytes = bytes.len(), "Fetch completed");
        Ok(bytes.to_vec())
    }
}

/// Fetch with bounded exponential backoff.
///
/// Performs an initial attempt plus up to `retry.max_retries` retries. The
/// wait starts at the configured initial backoff, doubles after each failed
/// attempt, and never exceeds the configured cap. After the ceiling, the
/// last failure (transport error or non-success status) is surfaced as a
/// [`BridgeError::Transport`].
pub async fn fetch_with_retries(
    fetcher: &dyn Fetch,
    url: &Url,
    retry: &RetryConfig,
) -> Result<Vec<u8>, BridgeError> {
    let mut backoff = retry.initial_backoff();
    let mut attempt: u32 = 0;

    loop {
        match fetcher.fetch(url).await {
            Ok(bytes) => return Ok(bytes),
            Err(err) => {
                if attempt >= retry.max_retries {
                    return Err(BridgeError::transport(err.to_string()));
                }
                attempt += 1;
                warn!(
                    url = %url,
                    attempt = attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "Fetch failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(retry.max_backoff());
            }
        }
    }
}
