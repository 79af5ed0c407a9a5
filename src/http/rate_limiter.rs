//! Token Bucket Rate Limiter
//!
//! Admission control for one upstream API. Every outbound request takes a
//! token first; tokens refill continuously at `rate` per second up to `capacity`
//! (the burst allowance). DexScreener allows 300 requests/min, so the default
//! bucket runs at 4 rps with a burst of 10.
//!
//! Refill and debit happen under a single mutex so concurrent collector tasks
//! cannot oversubscribe. Sleeping for a deficit happens outside the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Float slack when comparing the balance against one whole token
const TOKEN_EPSILON: f64 = 1e-9;

/// Lowest refill rate accepted (one token per 100s)
const MIN_RATE: f64 = 0.01;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    last_request: Option<Instant>,
}

/// Snapshot of limiter counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterStats {
    pub total_requests: u64,
    pub rate_limited_count: u64,
    pub tokens_available: f64,
    pub capacity: f64,
    pub since_last_request: Option<Duration>,
}

pub struct TokenBucket {
    name: String,
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
    total_requests: AtomicU64,
    rate_limited: AtomicU64,
}

impl TokenBucket {
    /// Create a full bucket refilling at `requests_per_second` with `burst` capacity.
    pub fn new(name: impl Into<String>, requests_per_second: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            name: name.into(),
            rate: requests_per_second.max(MIN_RATE),
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                last_request: None,
            }),
            total_requests: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
        }
    }

    /// Convenience for upstreams documented as "N requests per minute".
    pub fn per_minute(name: impl Into<String>, requests_per_minute: u32, burst: u32) -> Self {
        Self::new(name, f64::from(requests_per_minute) / 60.0, burst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Refill, then take one token if available.
    /// Returns `None` on success, or the time until a whole token accrues.
    async fn try_take(&self) -> Option<Duration> {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= 1.0 - TOKEN_EPSILON {
            state.tokens = (state.tokens - 1.0).max(0.0);
            state.last_request = Some(Instant::now());
            self.total_requests.fetch_add(1, Ordering::Relaxed);
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - state.tokens) / self.rate))
        }
    }

    /// Try to admit one request.
    ///
    /// With `wait = true` a short bucket sleeps for the deficit and retries once.
    /// Returns `false` (and counts a rate-limit event) if still no token.
    pub async fn acquire(&self, wait: bool) -> bool {
        let deficit = match self.try_take().await {
            None => return true,
            Some(deficit) => deficit,
        };

        if wait {
            debug!(
                limiter = %self.name,
                wait_ms = deficit.as_millis() as u64,
                "Token bucket empty, waiting"
            );
            sleep(deficit).await;
            if self.try_take().await.is_none() {
                return true;
            }
        }

        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Block until a token is granted. Contending tasks may steal the refill,
    /// so this loops over `acquire(true)`.
    pub async fn until_ready(&self) {
        while !self.acquire(true).await {}
    }

    /// Count a 429 seen from the upstream itself.
    pub fn record_upstream_throttle(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn rate_limited_count(&self) -> u64 {
        self.rate_limited.load(Ordering::Relaxed)
    }

    pub async fn stats(&self) -> RateLimiterStats {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        RateLimiterStats {
            total_requests: self.total_requests(),
            rate_limited_count: self.rate_limited_count(),
            tokens_available: state.tokens,
            capacity: self.capacity,
            since_last_request: state.last_request.map(|t| t.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_empty() {
        let bucket = TokenBucket::new("test", 2.0, 3);
        for _ in 0..3 {
            assert!(bucket.acquire(false).await);
        }
        assert!(!bucket.acquire(false).await);
        assert_eq!(bucket.total_requests(), 3);
        assert_eq!(bucket.rate_limited_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_over_time() {
        let bucket = TokenBucket::new("test", 2.0, 3);
        for _ in 0..3 {
            assert!(bucket.acquire(false).await);
        }
        advance(Duration::from_millis(500)).await;
        assert!(bucket.acquire(false).await);
        assert!(!bucket.acquire(false).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_capped_at_capacity() {
        let bucket = TokenBucket::new("test", 10.0, 5);
        advance(Duration::from_secs(60)).await;
        let stats = bucket.stats().await;
        assert!((stats.tokens_available - 5.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_for_deficit() {
        let bucket = TokenBucket::new("test", 4.0, 1);
        assert!(bucket.acquire(true).await);

        let start = Instant::now();
        assert!(bucket.acquire(true).await);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(249), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(260), "waited {:?}", waited);
        assert_eq!(bucket.rate_limited_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_stay_within_bounds() {
        let bucket = TokenBucket::new("test", 3.0, 4);
        let steps = [0u64, 10, 50, 333, 0, 0, 1000, 5000, 1, 2, 700, 0, 90];
        for (i, step) in steps.iter().cycle().take(200).enumerate() {
            advance(Duration::from_millis(*step)).await;
            bucket.acquire(i % 3 == 0).await;
            let stats = bucket.stats().await;
            assert!(stats.tokens_available >= 0.0);
            assert!(stats.tokens_available <= stats.capacity + 1e-9);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_grants_never_exceed_budget() {
        let bucket = TokenBucket::new("test", 5.0, 10);
        let mut granted = 0u64;
        for _ in 0..100 {
            for _ in 0..3 {
                if bucket.acquire(false).await {
                    granted += 1;
                }
            }
            advance(Duration::from_millis(100)).await;
        }
        // burst + rate * 10s
        assert!(granted <= 10 + 50, "granted {}", granted);
        assert_eq!(granted, bucket.total_requests());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_does_not_oversubscribe() {
        let bucket = std::sync::Arc::new(TokenBucket::new("test", 0.01, 5));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let b = bucket.clone();
            handles.push(tokio::spawn(async move { b.acquire(false).await }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap() {
                ok += 1;
            }
        }
        assert_eq!(ok, 5);
        assert_eq!(bucket.rate_limited_count(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_ready_eventually_admits() {
        let bucket = TokenBucket::per_minute("test", 60, 1);
        bucket.until_ready().await;
        let start = Instant::now();
        bucket.until_ready().await;
        assert!(start.elapsed() >= Duration::from_millis(999));
        assert_eq!(bucket.total_requests(), 2);
    }
}
