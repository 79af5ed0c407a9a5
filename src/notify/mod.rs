//! Notification fan-out
//!
//! Every channel implements `Notifier`. `NotifierSet` broadcasts one text to
//! all channels concurrently; a broadcast counts as delivered if any channel
//! accepted it. `DailyQuota` wraps a channel that has a per-day send cap.

pub mod discord;
pub mod format;
pub mod telegram;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub use discord::DiscordNotifier;
pub use telegram::TelegramNotifier;

/// One outbound channel
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver `text`. Returns false on any failure; never panics or errors.
    async fn send(&self, text: &str) -> bool;
}

/// Caps successful sends of the wrapped channel per UTC day
pub struct DailyQuota<N> {
    inner: N,
    limit: u32,
    // (day, successful sends that day)
    used: Mutex<(NaiveDate, u32)>,
}

impl<N: Notifier> DailyQuota<N> {
    pub fn new(inner: N, limit: u32) -> Self {
        Self {
            inner,
            limit,
            used: Mutex::new((Utc::now().date_naive(), 0)),
        }
    }

    /// Sends used today (resets when the UTC day rolls over)
    pub fn used_today(&self) -> u32 {
        self.used_on(Utc::now().date_naive())
    }

    pub fn remaining_today(&self) -> u32 {
        self.limit.saturating_sub(self.used_today())
    }

    fn used_on(&self, day: NaiveDate) -> u32 {
        let guard = self.used.lock().unwrap_or_else(|e| e.into_inner());
        if guard.0 == day {
            guard.1
        } else {
            0
        }
    }

    async fn send_on(&self, day: NaiveDate, text: &str) -> bool {
        if self.used_on(day) >= self.limit {
            debug!("{} daily quota ({}) exhausted, skipping", self.inner.name(), self.limit);
            return false;
        }

        let delivered = self.inner.send(text).await;
        if delivered {
            let mut guard = self.used.lock().unwrap_or_else(|e| e.into_inner());
            if guard.0 != day {
                *guard = (day, 0);
            }
            guard.1 += 1;
        }
        delivered
    }
}

#[async_trait]
impl<N: Notifier> Notifier for DailyQuota<N> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, text: &str) -> bool {
        self.send_on(Utc::now().date_naive(), text).await
    }
}

/// All configured channels
#[derive(Clone, Default)]
pub struct NotifierSet {
    channels: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Arc<dyn Notifier>) -> Self {
        info!("Notification channel enabled: {}", channel.name());
        self.channels.push(channel);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send to every channel concurrently. True if at least one delivered.
    pub async fn broadcast(&self, text: &str) -> bool {
        if self.channels.is_empty() {
            debug!("No notification channels configured");
            return false;
        }

        let results = join_all(self.channels.iter().map(|c| c.send(text))).await;

        let mut delivered = Vec::new();
        for (channel, ok) in self.channels.iter().zip(&results) {
            if *ok {
                delivered.push(channel.name());
            } else {
                warn!("Notification via {} failed", channel.name());
            }
        }

        if delivered.is_empty() {
            false
        } else {
            debug!("Notification delivered via {}", delivered.join(", "));
            true
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every text; succeeds or fails as configured
    pub struct RecordingNotifier {
        pub name: String,
        pub succeed: bool,
        pub sent: Mutex<Vec<String>>,
        pub attempts: AtomicUsize,
    }

    impl RecordingNotifier {
        pub fn new(name: &str, succeed: bool) -> Self {
            Self {
                name: name.to_string(),
                succeed,
                sent: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
            }
        }

        pub fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, text: &str) -> bool {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                self.sent.lock().unwrap().push(text.to_string());
            }
            self.succeed
        }
    }

    #[async_trait]
    impl Notifier for Arc<RecordingNotifier> {
        fn name(&self) -> &str {
            self.as_ref().name()
        }

        async fn send(&self, text: &str) -> bool {
            self.as_ref().send(text).await
        }
    }
}
