//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests made by the issue-tracker source:
//! - Building the HTTP client with the configured user agent and timeout
//! - GET requests for listing and detail pages
//! - Retry with backoff for transient failures
//! - Tightening the rate limit when the server answers 429
//! - Error classification into [`SourceError`]

use crate::rate_limit::RateLimiter;
use crate::{SourceError, SourceResult};
use reqwest::{header, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Backoff schedule for [`HttpFetcher::fetch`]
///
/// Each wait is multiplied by the attempt number, so the third 5xx in a row
/// waits three times `server_error_backoff`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first
    pub max_attempts: u32,
    pub rate_limited_backoff: Duration,
    pub server_error_backoff: Duration,
    pub network_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limited_backoff: Duration::from_secs(5),
            server_error_backoff: Duration::from_secs(2),
            network_backoff: Duration::from_secs(1),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - Value of the `User-Agent` header
/// * `timeout` - Whole-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );

    Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Host part of `url`, used as its rate-limit key
pub fn host_key(url: &str) -> SourceResult<String> {
    let parsed = Url::parse(url).map_err(|e| SourceError::InvalidUrl(format!("{}: {}", url, e)))?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| SourceError::InvalidUrl(format!("{}: no host", url)))
}

/// What to do after one attempt
enum Attempt {
    Done(String),
    Retry { wait: Duration, message: String },
    Fail(SourceError),
}

/// Fetches pages with retry, backoff and 429 handling
pub struct HttpFetcher {
    client: Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            client,
            limiter,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches `url` and returns the response body
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 2xx | Return body |
    /// | HTTP 429 | Tighten rate limit for the host, wait `rate_limited_backoff × attempt`, retry |
    /// | HTTP 5xx | Wait `server_error_backoff × attempt`, retry |
    /// | Network error | Wait `network_backoff × attempt`, retry |
    /// | Other status | Immediate `SourceError::Http` |
    ///
    /// Exhausting every attempt yields `SourceError::Transient`.
    pub async fn fetch(&self, url: &str) -> SourceResult<String> {
        let host = host_key(url)?;
        let attempts = self.policy.max_attempts.max(1);
        let mut last_failure = String::new();

        for attempt in 1..=attempts {
            match self.attempt(url, &host, attempt).await {
                Attempt::Done(body) => return Ok(body),
                Attempt::Fail(e) => return Err(e),
                Attempt::Retry { wait, message } => {
                    tracing::warn!("{} for {}, attempt {}/{}", message, url, attempt, attempts);
                    last_failure = message;
                    if attempt < attempts {
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        Err(SourceError::Transient {
            url: url.to_string(),
            message: format!("{} after {} attempts", last_failure, attempts),
        })
    }

    async fn attempt(&self, url: &str, host: &str, attempt: u32) -> Attempt {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::Retry {
                    wait: self.policy.network_backoff * attempt,
                    message: classify_network_error(&e),
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            return match response.text().await {
                Ok(body) => Attempt::Done(body),
                Err(e) => Attempt::Retry {
                    wait: self.policy.network_backoff * attempt,
                    message: format!("Failed to read body: {}", e),
                },
            };
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            self.limiter.tighten(host);
            return Attempt::Retry {
                wait: self.policy.rate_limited_backoff * attempt,
                message: "Rate limited (429)".to_string(),
            };
        }

        if status.is_server_error() {
            return Attempt::Retry {
                wait: self.policy.server_error_backoff * attempt,
                message: format!("Server error {}", status.as_u16()),
            };
        }

        tracing::error!("HTTP error {} for URL: {}", status.as_u16(), url);
        Attempt::Fail(SourceError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn classify_network_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        "Connection refused".to_string()
    } else {
        format!("Request failed: {}", e)
    }
}
