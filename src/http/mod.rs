//! Upstream Access Layer
//!
//! Rate limiting, response caching and retrying HTTP for the price oracles
//! and quote aggregator. One `TokenBucket` + `ResilientFetcher` pair is built
//! per upstream at startup and shared via `Arc`.

pub mod cache;
pub mod fetcher;
pub mod rate_limiter;

pub use cache::{cache_key, CacheStats, CacheTtls, TtlCache};
pub use fetcher::{
    parse_retry_after, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport,
    ResilientFetcher, RetryPolicy,
};
pub use rate_limiter::{RateLimiterStats, TokenBucket};
