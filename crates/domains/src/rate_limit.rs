//! # Rate limiting model
//!
//! Two independent fixed windows (hour and day) per identity and namespace.
//! A window resets to zero the moment `now` reaches its recorded reset time,
//! and the next reset is scheduled one full window after that moment.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Quota bucket names shared by the limiter and its callers.
pub mod namespaces {
    pub const SUBMISSION: &str = "submission";
    pub const UPLOAD: &str = "upload";
}

pub const HOUR_SECS: i64 = 60 * 60;
pub const DAY_SECS: i64 = 24 * 60 * 60;

/// Ceilings for one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub hourly: u32,
    pub daily: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self { hourly: 3, daily: 10 }
    }
}

/// Per-namespace policies with a fallback for unknown namespaces.
#[derive(Debug, Clone, Default)]
pub struct RateLimitPolicies {
    fallback: RateLimitPolicy,
    by_namespace: HashMap<String, RateLimitPolicy>,
}

impl RateLimitPolicies {
    pub fn new(fallback: RateLimitPolicy) -> Self {
        Self {
            fallback,
            by_namespace: HashMap::new(),
        }
    }

    pub fn with(mut self, namespace: &str, policy: RateLimitPolicy) -> Self {
        self.by_namespace.insert(namespace.to_string(), policy);
        self
    }

    pub fn for_namespace(&self, namespace: &str) -> RateLimitPolicy {
        self.by_namespace
            .get(namespace)
            .copied()
            .unwrap_or(self.fallback)
    }

    pub fn is_known(&self, namespace: &str) -> bool {
        self.by_namespace.contains_key(namespace)
    }
}

/// Outcome of a limiter check or status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining_hour: u32,
    pub remaining_day: u32,
    pub reset_in_hour_secs: u64,
    pub reset_in_day_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RateLimitDecision {
    /// Status of an identity that has never been seen.
    pub fn fresh(policy: RateLimitPolicy) -> Self {
        Self {
            allowed: policy.hourly > 0 && policy.daily > 0,
            remaining_hour: policy.hourly,
            remaining_day: policy.daily,
            reset_in_hour_secs: HOUR_SECS as u64,
            reset_in_day_secs: DAY_SECS as u64,
            reason: None,
        }
    }

    /// Seconds a client should wait before retrying, per the violated window.
    pub fn retry_after_secs(&self) -> u64 {
        if self.allowed {
            0
        } else if self.remaining_hour == 0 {
            self.reset_in_hour_secs
        } else {
            self.reset_in_day_secs
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

impl WindowCounter {
    fn new(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + window,
        }
    }

    fn roll(&mut self, now: DateTime<Utc>, window: Duration) {
        if now >= self.reset_at {
            self.count = 0;
            self.reset_at = now + window;
        }
    }

    /// Count as it would read after a roll, without mutating.
    fn effective_count(&self, now: DateTime<Utc>) -> u32 {
        if now >= self.reset_at {
            0
        } else {
            self.count
        }
    }

    fn reset_in_secs(&self, now: DateTime<Utc>, window: Duration) -> u64 {
        if now >= self.reset_at {
            return window.num_seconds() as u64;
        }
        let millis = (self.reset_at - now).num_milliseconds();
        ((millis + 999) / 1000) as u64
    }
}

/// Counters for one identity × namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub hour: WindowCounter,
    pub day: WindowCounter,
}

impl RateLimitRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            hour: WindowCounter::new(now, hour()),
            day: WindowCounter::new(now, day()),
        }
    }

    /// Rebuild a record from externally stored counters (e.g., a shared cache).
    pub fn from_parts(
        hour_count: u32,
        hour_reset_at: DateTime<Utc>,
        day_count: u32,
        day_reset_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hour: WindowCounter {
                count: hour_count,
                reset_at: hour_reset_at,
            },
            day: WindowCounter {
                count: day_count,
                reset_at: day_reset_at,
            },
        }
    }

    /// Expire stale windows, then consume one unit of both quotas if neither
    /// ceiling is reached. Callers must hold exclusive access to the record.
    pub fn check_and_increment(&mut self, now: DateTime<Utc>, policy: RateLimitPolicy) -> RateLimitDecision {
        self.hour.roll(now, hour());
        self.day.roll(now, day());

        if let Some(denied) = self.denial(now, policy) {
            return denied;
        }

        self.hour.count += 1;
        self.day.count += 1;
        self.granted(now, policy)
    }

    /// Read-only view used for pre-flight checks.
    pub fn peek(&self, now: DateTime<Utc>, policy: RateLimitPolicy) -> RateLimitDecision {
        let hour_count = self.hour.effective_count(now);
        let day_count = self.day.effective_count(now);
        RateLimitDecision {
            allowed: hour_count < policy.hourly && day_count < policy.daily,
            remaining_hour: policy.hourly.saturating_sub(hour_count),
            remaining_day: policy.daily.saturating_sub(day_count),
            reset_in_hour_secs: self.hour.reset_in_secs(now, hour()),
            reset_in_day_secs: self.day.reset_in_secs(now, day()),
            reason: None,
        }
    }

    /// Denial for the current counters, hourly ceiling first.
    pub fn denial(&self, now: DateTime<Utc>, policy: RateLimitPolicy) -> Option<RateLimitDecision> {
        let reset_in_hour_secs = self.hour.reset_in_secs(now, hour());
        let reset_in_day_secs = self.day.reset_in_secs(now, day());

        if self.hour.count >= policy.hourly {
            return Some(RateLimitDecision {
                allowed: false,
                remaining_hour: 0,
                remaining_day: policy.daily.saturating_sub(self.day.count),
                reset_in_hour_secs,
                reset_in_day_secs,
                reason: Some(format!(
                    "hourly limit of {} reached; please try again later",
                    policy.hourly
                )),
            });
        }

        if self.day.count >= policy.daily {
            return Some(RateLimitDecision {
                allowed: false,
                remaining_hour: policy.hourly.saturating_sub(self.hour.count),
                remaining_day: 0,
                reset_in_hour_secs,
                reset_in_day_secs,
                reason: Some(format!(
                    "daily limit of {} reached; please try again tomorrow",
                    policy.daily
                )),
            });
        }

        None
    }

    /// Allowed decision reflecting counters after the increment.
    pub fn granted(&self, now: DateTime<Utc>, policy: RateLimitPolicy) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            remaining_hour: policy.hourly.saturating_sub(self.hour.count),
            remaining_day: policy.daily.saturating_sub(self.day.count),
            reset_in_hour_secs: self.hour.reset_in_secs(now, hour()),
            reset_in_day_secs: self.day.reset_in_secs(now, day()),
            reason: None,
        }
    }
}

pub fn hour() -> Duration {
    Duration::seconds(HOUR_SECS)
}

pub fn day() -> Duration {
    Duration::seconds(DAY_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn hourly_ceiling_blocks_even_with_daily_quota_left() {
        let policy = RateLimitPolicy::default();
        let mut record = RateLimitRecord::new(t0());

        for i in 0..3 {
            let d = record.check_and_increment(t0() + Duration::seconds(i), policy);
            assert!(d.allowed);
        }
        let d = record.check_and_increment(t0() + Duration::seconds(10), policy);
        assert!(!d.allowed);
        assert_eq!(d.remaining_hour, 0);
        assert_eq!(d.remaining_day, 7);
        assert!(d.reason.unwrap().contains("hourly"));
        // denied checks do not consume quota
        assert_eq!(record.hour.count, 3);
        assert_eq!(record.day.count, 3);
    }

    #[test]
    fn hourly_reported_first_when_both_exhausted() {
        let policy = RateLimitPolicy { hourly: 1, daily: 1 };
        let mut record = RateLimitRecord::new(t0());
        assert!(record.check_and_increment(t0(), policy).allowed);
        let d = record.check_and_increment(t0(), policy);
        assert!(d.reason.unwrap().starts_with("hourly"));
    }

    #[test]
    fn hour_window_resets_exactly_at_reset_time() {
        let policy = RateLimitPolicy::default();
        let mut record = RateLimitRecord::new(t0());
        for _ in 0..3 {
            record.check_and_increment(t0(), policy);
        }
        let reset_at = t0() + hour();
        assert!(!record.check_and_increment(reset_at - Duration::milliseconds(1), policy).allowed);

        let d = record.check_and_increment(reset_at, policy);
        assert!(d.allowed);
        assert_eq!(d.remaining_hour, 2);
        assert_eq!(record.hour.count, 1);
        assert_eq!(record.hour.reset_at, reset_at + hour());
        // the day window keeps counting
        assert_eq!(record.day.count, 4);
    }

    #[test]
    fn daily_ceiling_applies_across_hours() {
        let policy = RateLimitPolicy::default();
        let mut record = RateLimitRecord::new(t0());
        let mut now = t0();
        let mut allowed = 0;
        for _ in 0..6 {
            for _ in 0..3 {
                if record.check_and_increment(now, policy).allowed {
                    allowed += 1;
                }
            }
            now += hour();
        }
        assert_eq!(allowed, 10);
        let d = record.check_and_increment(now, policy);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("daily"));
        assert_eq!(d.remaining_day, 0);
    }

    #[test]
    fn reset_in_rounds_up_to_whole_seconds() {
        let policy = RateLimitPolicy::default();
        let mut record = RateLimitRecord::new(t0());
        let d = record.check_and_increment(t0() + Duration::milliseconds(1500), policy);
        assert_eq!(d.reset_in_hour_secs, 3599);
        assert_eq!(d.reset_in_day_secs, 86_399);
    }

    #[test]
    fn peek_does_not_mutate_and_treats_expired_as_zero() {
        let policy = RateLimitPolicy::default();
        let mut record = RateLimitRecord::new(t0());
        for _ in 0..3 {
            record.check_and_increment(t0(), policy);
        }
        let before = record;
        let d = record.peek(t0(), policy);
        assert!(!d.allowed);
        assert_eq!(record, before);

        let later = record.peek(t0() + hour(), policy);
        assert!(later.allowed);
        assert_eq!(later.remaining_hour, 3);
        assert_eq!(later.reset_in_hour_secs, HOUR_SECS as u64);
    }

    #[test]
    fn retry_after_follows_the_violated_window() {
        let policy = RateLimitPolicy { hourly: 5, daily: 1 };
        let mut record = RateLimitRecord::new(t0());
        record.check_and_increment(t0(), policy);
        let d = record.check_and_increment(t0(), policy);
        assert_eq!(d.retry_after_secs(), d.reset_in_day_secs);
    }

    #[test]
    fn policies_fall_back_for_unknown_namespaces() {
        let policies = RateLimitPolicies::new(RateLimitPolicy::default())
            .with(namespaces::UPLOAD, RateLimitPolicy { hourly: 20, daily: 50 });
        assert_eq!(policies.for_namespace(namespaces::UPLOAD).hourly, 20);
        assert_eq!(policies.for_namespace("other"), RateLimitPolicy::default());
        assert!(policies.is_known(namespaces::UPLOAD));
        assert!(!policies.is_known("other"));
    }
}
