//! Per-component alert rate limiting.
//!
//! At most one alert per component is accepted inside a rolling window.
//! Alerts arriving inside the window are dropped, not queued, so the next
//! accepted alert always reflects the current state.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Last accepted alert for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub component: String,
    pub last_sent_at: DateTime<Utc>,
}

/// Rolling-window alert limiter keyed by component.
#[derive(Debug)]
pub struct AlertRateLimiter {
    window: Duration,
    records: DashMap<String, AlertRecord>,
}

impl AlertRateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            records: DashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether an alert for `component` would be accepted at `now`.
    pub fn is_allowed(&self, component: &str, now: DateTime<Utc>) -> bool {
        self.records
            .get(component)
            .is_none_or(|record| now.signed_duration_since(record.last_sent_at) >= self.window)
    }

    /// Accept an alert if the window allows it and `send` succeeds.
    ///
    /// The record is only overwritten when `send` returns true, and the
    /// check-and-update happens under the component's map entry lock.
    pub fn try_acquire_with(
        &self,
        component: &str,
        now: DateTime<Utc>,
        send: impl FnOnce() -> bool,
    ) -> bool {
        match self.records.entry(component.to_string()) {
            Entry::Occupied(mut occupied) => {
                let elapsed = now.signed_duration_since(occupied.get().last_sent_at);
                if elapsed < self.window {
                    debug!(
                        component = %component,
                        elapsed_secs = elapsed.num_seconds(),
                        "Alert suppressed by rate limit"
                    );
                    return false;
                }
                if !send() {
                    return false;
                }
                occupied.get_mut().last_sent_at = now;
                true
            }
            Entry::Vacant(vacant) => {
                if !send() {
                    return false;
                }
                vacant.insert(AlertRecord {
                    component: component.to_string(),
                    last_sent_at: now,
                });
                true
            }
        }
    }

    /// Accept an alert if the window allows it.
    pub fn try_acquire(&self, component: &str, now: DateTime<Utc>) -> bool {
        self.try_acquire_with(component, now, || true)
    }

    pub fn last_sent_at(&self, component: &str) -> Option<DateTime<Utc>> {
        self.records.get(component).map(|r| r.last_sent_at)
    }

    pub fn records(&self) -> Vec<AlertRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_alert_allowed() {
        let limiter = AlertRateLimiter::new(Duration::hours(1));
        let now = Utc::now();
        assert!(limiter.is_allowed("store", now));
        assert!(limiter.try_acquire("store", now));
        assert_eq!(limiter.last_sent_at("store"), Some(now));
    }

    #[test]
    fn test_second_alert_inside_window_suppressed() {
        let limiter = AlertRateLimiter::new(Duration::hours(1));
        let now = Utc::now();
        assert!(limiter.try_acquire("store", now));
        assert!(!limiter.try_acquire("store", now + Duration::minutes(59)));
        // Suppressed alerts do not extend the window.
        assert_eq!(limiter.last_sent_at("store"), Some(now));
        assert!(limiter.try_acquire("store", now + Duration::hours(1)));
    }

    #[test]
    fn test_components_limited_independently() {
        let limiter = AlertRateLimiter::new(Duration::hours(1));
        let now = Utc::now();
        assert!(limiter.try_acquire("store", now));
        assert!(limiter.try_acquire("broker", now));
        assert!(!limiter.try_acquire("store", now));
        assert_eq!(limiter.records().len(), 2);
    }

    #[test]
    fn test_failed_send_does_not_consume_window() {
        let limiter = AlertRateLimiter::new(Duration::hours(1));
        let now = Utc::now();
        assert!(!limiter.try_acquire_with("store", now, || false));
        assert!(limiter.last_sent_at("store").is_none());
        assert!(limiter.try_acquire("store", now));
    }

    #[test]
    fn test_many_alerts_in_window_only_one_accepted() {
        let limiter = AlertRateLimiter::new(Duration::hours(1));
        let start = Utc::now();
        let accepted = (0..60)
            .filter(|minute| limiter.try_acquire("worker", start + Duration::minutes(*minute)))
            .count();
        assert_eq!(accepted, 1);
    }
}
