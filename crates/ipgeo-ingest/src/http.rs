//! HTTP client with a bounded retry policy
//!
//! Every GET issued by the pipeline goes through [`HttpClient::get`], which
//! retries connection failures, timeouts and transient statuses (5xx, 408,
//! 429) with exponential backoff. Callers never retry on their own.

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{IngestError, Result};

const USER_AGENT: &str = concat!("ipgeo-ingest/", env!("CARGO_PKG_VERSION"));

/// Retry budget for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff_base_secs ^ n` seconds
    pub backoff_base_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 2,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs(self.backoff_base_secs.saturating_pow(attempt))
    }
}

/// Whether a status is worth another attempt
fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Whether a transport error is worth another attempt
fn is_transient_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request() || err.is_body()
}

/// Shared HTTP client used by the source locator and the downloader
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET `url`, returning the first successful response.
    ///
    /// The body is not read here, so large downloads can be streamed by the caller.
    pub async fn get(&self, url: &str) -> Result<Response> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let failure = match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    if !is_transient(status) || attempt >= max_attempts {
                        return Err(IngestError::HttpStatus {
                            url: url.to_string(),
                            status,
                            attempts: attempt,
                        });
                    }
                    format!("HTTP {status}")
                },
                Err(err) => {
                    if !is_transient_error(&err) || attempt >= max_attempts {
                        return Err(IngestError::Http {
                            url: url.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }
                    err.to_string()
                },
            };

            let delay = self.policy.backoff(attempt);
            warn!(
                url,
                attempt,
                max_attempts,
                error = %failure,
                "Request attempt failed"
            );
            info!("Retrying in {} seconds...", delay.as_secs());
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// GET `url` and read the whole body as text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        response.text().await.map_err(|source| IngestError::Http {
            url: url.to_string(),
            attempts: 1,
            source,
        })
    }
}
