//! Upstream Error Types
//!
//! Failures talking to price oracles and quote aggregators are classified here
//! so the retry policy can decide between backing off, honoring a server hint,
//! or failing fast. Application plumbing (config, startup) uses `anyhow`.

use std::time::Duration;
use thiserror::Error;

/// A failed upstream request, classified by how it should be handled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Request exceeded the client timeout
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection refused/reset, DNS failure, TLS failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP 429 from the upstream
    #[error("rate limited by upstream (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other non-2xx status; body kept so callers can parse error payloads
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be decoded into the expected shape
    #[error("malformed response: {0}")]
    Decode(String),

    /// Response decoded but carried nothing usable
    #[error("no data: {0}")]
    NoData(String),
}

impl FetchError {
    /// Network-level failures that are worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Connection(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::RateLimited { .. } => Some(429),
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A cross-chain quote that could not be obtained or used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteError {
    /// The aggregator answered with a structured error
    #[error("quote rejected (HTTP {status}): {message}")]
    Rejected {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("malformed quote: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout("x".into()).is_transient());
        assert!(FetchError::Connection("reset".into()).is_transient());
        assert!(!FetchError::RateLimited { retry_after: None }.is_transient());
        assert!(!FetchError::Status { status: 404, body: String::new() }.is_transient());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(FetchError::RateLimited { retry_after: None }.status(), Some(429));
        assert_eq!(
            FetchError::Status { status: 503, body: "down".into() }.status(),
            Some(503)
        );
        assert_eq!(FetchError::Decode("bad".into()).status(), None);
    }
}
