use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use domains::{RateLimitDecision, RateLimitPolicies, RateLimitRecord, RateLimiter, Result};

use super::record_key;

/// Process-local limiter.
///
/// Each check holds the map shard lock for its key while it reads, compares
/// and increments, so concurrent requests from one identity cannot both
/// slip under the ceiling.
pub struct InMemoryRateLimiter {
    records: DashMap<String, RateLimitRecord>,
    policies: RateLimitPolicies,
}

impl InMemoryRateLimiter {
    pub fn new(policies: RateLimitPolicies) -> Self {
        Self {
            records: DashMap::new(),
            policies,
        }
    }

    pub fn check_at(&self, identity: &str, namespace: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let policy = self.policies.for_namespace(namespace);
        let mut record = self
            .records
            .entry(record_key(namespace, identity))
            .or_insert_with(|| RateLimitRecord::new(now));
        let decision = record.check_and_increment(now, policy);
        if !decision.allowed {
            debug!(namespace, "rate limit exceeded");
        }
        decision
    }

    pub fn status_at(&self, identity: &str, namespace: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let policy = self.policies.for_namespace(namespace);
        match self.records.get(&record_key(namespace, identity)) {
            Some(record) => record.peek(now, policy),
            None => RateLimitDecision::fresh(policy),
        }
    }

    /// Drops records whose day window has passed; they would reset on next use anyway.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| now < record.day.reset_at);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, identity: &str, namespace: &str) -> Result<RateLimitDecision> {
        Ok(self.check_at(identity, namespace, Utc::now()))
    }

    async fn status(&self, identity: &str, namespace: &str) -> Result<RateLimitDecision> {
        Ok(self.status_at(identity, namespace, Utc::now()))
    }

    async fn clear(&self, identity: &str, namespace: &str) -> Result<()> {
        self.records.remove(&record_key(namespace, identity));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use domains::{namespaces, RateLimitPolicy};
    use std::sync::Arc;

    fn limiter() -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(
            RateLimitPolicies::new(RateLimitPolicy::default())
                .with(namespaces::UPLOAD, RateLimitPolicy { hourly: 1, daily: 2 }),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn fourth_submission_in_an_hour_is_denied() {
        let limiter = limiter();
        for _ in 0..3 {
            assert!(limiter.check_at("1.2.3.4", namespaces::SUBMISSION, t0()).allowed);
        }
        let denied = limiter.check_at("1.2.3.4", namespaces::SUBMISSION, t0() + Duration::minutes(5));
        assert!(!denied.allowed);
        assert_eq!(denied.remaining_day, 7);
        assert_eq!(denied.reset_in_hour_secs, 55 * 60);
    }

    #[test]
    fn identities_and_namespaces_are_independent() {
        let limiter = limiter();
        assert!(limiter.check_at("a", namespaces::UPLOAD, t0()).allowed);
        assert!(!limiter.check_at("a", namespaces::UPLOAD, t0()).allowed);
        assert!(limiter.check_at("b", namespaces::UPLOAD, t0()).allowed);
        assert!(limiter.check_at("a", namespaces::SUBMISSION, t0()).allowed);
    }

    #[test]
    fn status_reads_without_consuming() {
        let limiter = limiter();
        let fresh = limiter.status_at("a", namespaces::SUBMISSION, t0());
        assert_eq!(fresh.remaining_hour, 3);
        assert!(limiter.is_empty());

        limiter.check_at("a", namespaces::SUBMISSION, t0());
        for _ in 0..5 {
            assert_eq!(limiter.status_at("a", namespaces::SUBMISSION, t0()).remaining_hour, 2);
        }
    }

    #[tokio::test]
    async fn clear_resets_an_identity() {
        let limiter = limiter();
        limiter.check(" a", namespaces::UPLOAD).await.unwrap();
        limiter.clear(" a", namespaces::UPLOAD).await.unwrap();
        assert!(limiter.check(" a", namespaces::UPLOAD).await.unwrap().allowed);
    }

    #[test]
    fn purge_drops_only_expired_records() {
        let limiter = limiter();
        limiter.check_at("old", namespaces::SUBMISSION, t0());
        limiter.check_at("new", namespaces::SUBMISSION, t0() + Duration::hours(12));
        assert_eq!(limiter.purge_expired(t0() + Duration::hours(25)), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_checks_never_exceed_the_ceiling() {
        let limiter = Arc::new(limiter());
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.check("burst", namespaces::SUBMISSION).await.unwrap() })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap().allowed {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 3);
    }
}
