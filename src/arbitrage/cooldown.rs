//! Arbitrage Alert Cooldown
//!
//! The same cheap→rich window tends to persist for many polling cycles. This
//! keeps it from being re-sent every cycle: once a key has been alerted, it is
//! suppressed until `window` has elapsed.
//!
//! Design:
//!     - Key: `asset:cheap->rich` (see `ArbitrageOpportunity::alert_key`)
//!     - Fixed window (default 300s), measured from the last sent alert
//!     - window = 0 disables debouncing
//!     - `cleanup` drops expired keys to bound memory

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Per-key alert debounce
pub struct AlertCooldown {
    last_sent: HashMap<String, Instant>,
    window: Duration,
}

impl AlertCooldown {
    pub fn new(window: Duration) -> Self {
        Self {
            last_sent: HashMap::new(),
            window,
        }
    }

    /// True if `key` was alerted less than `window` ago.
    pub fn is_cooled_down(&self, key: &str) -> bool {
        if self.window.is_zero() {
            return false;
        }
        self.last_sent
            .get(key)
            .map(|sent| sent.elapsed() < self.window)
            .unwrap_or(false)
    }

    /// Claim the alert slot for `key`. Returns false while it is cooling down.
    pub fn try_claim(&mut self, key: &str) -> bool {
        if self.is_cooled_down(key) {
            debug!("Alert cooldown: {} suppressed", key);
            return false;
        }
        self.last_sent.insert(key.to_string(), Instant::now());
        true
    }

    /// Drop expired keys.
    pub fn cleanup(&mut self) {
        let window = self.window;
        let before = self.last_sent.len();
        self.last_sent.retain(|_, sent| sent.elapsed() < window);
        let removed = before - self.last_sent.len();
        if removed > 0 {
            debug!("Alert cooldown cleanup: removed {} expired keys", removed);
        }
    }

    /// Keys currently tracked (including expired ones not yet cleaned up).
    pub fn active_count(&self) -> usize {
        self.last_sent.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Change the window; already-tracked keys keep their timestamps.
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }
}
