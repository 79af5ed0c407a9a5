//! Resilient Fetcher
//!
//! One logical request = limiter admission + HTTP call + classified retries.
//!
//! Failure handling (see `RetryPolicy::delay_for`):
//! - timeout / connection failure → retry, doubling backoff from `base_delay`
//! - HTTP 429 → retry after the server's `Retry-After` hint, or a steeper
//!   backoff from `throttle_base_delay`; both capped at `max_delay`
//! - any other HTTP error or undecodable body → fail immediately
//!
//! All classes share one attempt budget. When it runs out the last failure is returned.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::rate_limiter::TokenBucket;
use crate::errors::FetchError;

/// Outbound GET request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl ToString) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }
}

/// Raw response; status classification is left to the fetcher
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport seam. Production uses reqwest; tests script responses.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// reqwest-backed transport (rustls, per-request timeout)
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pegarb-bot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let url = if request.query.is_empty() {
            reqwest::Url::parse(&request.url)
        } else {
            reqwest::Url::parse_with_params(&request.url, &request.query)
        }
        .map_err(|e| FetchError::Connection(format!("invalid url {}: {}", request.url, e)))?;

        let mut builder = self.client.get(url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(classify_reqwest_error)?;

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(err.to_string())
    } else if err.is_decode() || err.is_body() {
        FetchError::Decode(err.to_string())
    } else {
        FetchError::Connection(err.to_string())
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
///
/// Unusable values (dates, negatives, NaN, infinities, overflow) yield `None`
/// so the caller falls back to its own backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

/// Unified retry/backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub throttle_base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            throttle_base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), or `None` if this failure is final.
    pub fn delay_for(&self, error: &FetchError, attempt: u32) -> Option<Duration> {
        let factor = 2u32.saturating_pow(attempt);
        match error {
            FetchError::Timeout(_) | FetchError::Connection(_) => {
                Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
            }
            FetchError::RateLimited {
                retry_after: Some(hint),
            } => Some((*hint).min(self.max_delay)),
            FetchError::RateLimited { retry_after: None } => {
                Some(self.throttle_base_delay.saturating_mul(factor).min(self.max_delay))
            }
            FetchError::Status { .. } | FetchError::Decode(_) | FetchError::NoData(_) => None,
        }
    }
}

/// Rate-limited, retrying GET client for one upstream
pub struct ResilientFetcher {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<TokenBucket>,
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: Arc<TokenBucket>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            limiter,
            policy,
        }
    }

    pub fn limiter(&self) -> &Arc<TokenBucket> {
        &self.limiter
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute with admission control and retries. Returns only 2xx responses.
    pub async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, FetchError> {
        let mut attempt = 0u32;
        loop {
            self.limiter.until_ready().await;

            let failure = match self.transport.execute(request).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) if response.status == 429 => {
                    self.limiter.record_upstream_throttle();
                    FetchError::RateLimited {
                        retry_after: response.retry_after,
                    }
                }
                Ok(response) => FetchError::Status {
                    status: response.status,
                    body: response.body,
                },
                Err(e) => e,
            };

            let delay = match self.policy.delay_for(&failure, attempt) {
                Some(delay) if attempt < self.policy.max_retries => delay,
                Some(_) => {
                    warn!(
                        limiter = %self.limiter.name(),
                        "Giving up on {} after {} attempts: {}",
                        request.url,
                        attempt + 1,
                        failure
                    );
                    return Err(failure);
                }
                None => {
                    debug!("Non-retryable failure for {}: {}", request.url, failure);
                    return Err(failure);
                }
            };

            warn!(
                limiter = %self.limiter.name(),
                "Attempt {}/{} for {} failed ({}), retrying in {:.1}s",
                attempt + 1,
                self.policy.max_retries + 1,
                request.url,
                failure,
                delay.as_secs_f64()
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// `fetch` then decode the body as JSON.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &HttpRequest) -> Result<T, FetchError> {
        let response = self.fetch(request).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| FetchError::Decode(format!("{}: {}", request.url, e)))
    }
}
