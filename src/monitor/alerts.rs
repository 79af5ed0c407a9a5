//! Alert state
//!
//! `DepegTracker` turns the per-cycle `is_alert` flag into an edge trigger:
//! a depeg alert fires only on the normal → alert transition of an
//! (asset, chain) key, and re-arms once the key is back to normal.
//!
//! `HeartbeatSchedule` decides when the daily heartbeat is due: inside a
//! window starting at `heartbeat_hour` local time, at most once per local day.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use std::collections::HashMap;
use tracing::warn;

use crate::types::PriceRecord;

/// Edge-triggered depeg state per (asset, chain)
#[derive(Debug, Default)]
pub struct DepegTracker {
    last_state: HashMap<(String, String), bool>,
    fired: u64,
}

impl DepegTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record this cycle's state for `record`. Returns true if an alert
    /// should be sent (the key just entered the alert state).
    pub fn observe(&mut self, record: &PriceRecord) -> bool {
        let prev = self
            .last_state
            .insert(record.key(), record.is_alert)
            .unwrap_or(false);
        let fire = record.is_alert && !prev;
        if fire {
            self.fired += 1;
        }
        fire
    }

    /// Keys currently in the alert state
    pub fn alerting(&self) -> usize {
        self.last_state.values().filter(|v| **v).count()
    }

    /// Alerts fired since start
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

/// Daily heartbeat timing in a fixed UTC offset
#[derive(Debug, Clone)]
pub struct HeartbeatSchedule {
    offset: FixedOffset,
    hour: u32,
    window_minutes: u32,
    last_sent: Option<NaiveDate>,
}

impl HeartbeatSchedule {
    pub const DEFAULT_WINDOW_MINUTES: u32 = 30;

    pub fn new(utc_offset_hours: i32, hour: u32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| {
            warn!("Invalid UTC offset {}h, heartbeat falls back to UTC", utc_offset_hours);
            Utc.fix()
        });
        Self {
            offset,
            hour: hour.min(23),
            window_minutes: Self::DEFAULT_WINDOW_MINUTES,
            last_sent: None,
        }
    }

    /// Keep the previous schedule's sent-day, so a reload inside the window
    /// does not send a second heartbeat.
    pub fn carry_over(mut self, previous: &HeartbeatSchedule) -> Self {
        self.last_sent = previous.last_sent;
        self
    }

    pub fn local_time(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset)
    }

    /// True while inside today's window and nothing was sent today.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let local = self.local_time(now);
        if local.hour() != self.hour || local.minute() >= self.window_minutes {
            return false;
        }
        self.last_sent != Some(local.date_naive())
    }

    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        self.last_sent = Some(self.local_time(now).date_naive());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PriceSource, RiskLevel};
    use chrono::TimeZone;

    fn status(chain: &str, is_alert: bool) -> PriceRecord {
        PriceRecord {
            asset_name: "USDe".into(),
            chain: chain.into(),
            price_usd: if is_alert { 0.99 } else { 1.0 },
            deviation_pct: if is_alert { -1.0 } else { 0.0 },
            threshold: 0.5,
            is_alert,
            token_address: "0x5d3a1ff2b6bab83b63cd9ad0787074081a52ef34".into(),
            counter_asset_name: None,
            pool_exchange_rate: None,
            liquidity_usd: None,
            venue: None,
            price_source: PriceSource::TokenEndpoint,
            risk: RiskLevel::Safe,
        }
    }

    #[test]
    fn test_depeg_edge_trigger() {
        let mut tracker = DepegTracker::new();
        assert!(!tracker.observe(&status("base", false)));
        assert!(tracker.observe(&status("base", true)));
        // Still depegged: no repeat
        assert!(!tracker.observe(&status("base", true)));
        assert_eq!(tracker.alerting(), 1);

        // Recovery re-arms
        assert!(!tracker.observe(&status("base", false)));
        assert!(tracker.observe(&status("base", true)));
        assert_eq!(tracker.fired(), 2);
    }

    #[test]
    fn test_depeg_first_sighting_in_alert_fires() {
        let mut tracker = DepegTracker::new();
        assert!(tracker.observe(&status("bsc", true)));
        // Independent chain
        assert!(tracker.observe(&status("base", true)));
        assert_eq!(tracker.alerting(), 2);
    }

    #[test]
    fn test_heartbeat_window() {
        let mut hb = HeartbeatSchedule::new(8, 12);

        // 03:59 UTC = 11:59 +08:00
        let before = Utc.with_ymd_and_hms(2026, 3, 1, 3, 59, 0).unwrap();
        assert!(!hb.is_due(before));

        // 04:10 UTC = 12:10 +08:00
        let inside = Utc.with_ymd_and_hms(2026, 3, 1, 4, 10, 0).unwrap();
        assert!(hb.is_due(inside));
        hb.mark_sent(inside);
        assert!(!hb.is_due(Utc.with_ymd_and_hms(2026, 3, 1, 4, 20, 0).unwrap()));

        // 04:30 UTC = 12:30 +08:00, window closed
        let mut fresh = HeartbeatSchedule::new(8, 12);
        assert!(!fresh.is_due(Utc.with_ymd_and_hms(2026, 3, 1, 4, 30, 0).unwrap()));

        // Next local day
        let tomorrow = Utc.with_ymd_and_hms(2026, 3, 2, 4, 0, 0).unwrap();
        assert!(hb.is_due(tomorrow));
        fresh.mark_sent(tomorrow);
        assert!(!fresh.is_due(tomorrow));
    }

    #[test]
    fn test_heartbeat_carry_over() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 4, 10, 0).unwrap();
        let mut old = HeartbeatSchedule::new(8, 12);
        old.mark_sent(t);
        let reloaded = HeartbeatSchedule::new(8, 12).carry_over(&old);
        assert!(!reloaded.is_due(t));
    }

    #[test]
    fn test_heartbeat_local_day_crosses_utc_midnight() {
        // 00:15 local (+08:00) is 16:15 UTC of the previous day
        let mut hb = HeartbeatSchedule::new(8, 0);
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 16, 15, 0).unwrap();
        assert!(hb.is_due(t));
        hb.mark_sent(t);
        assert_eq!(hb.local_time(t).date_naive(), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert!(!hb.is_due(Utc.with_ymd_and_hms(2026, 3, 1, 16, 20, 0).unwrap()));
    }
}
