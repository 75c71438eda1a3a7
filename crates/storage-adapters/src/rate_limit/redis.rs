//! Redis-backed limiter for multi-instance deployments.
//!
//! The check runs as a single Lua script so the read, roll, compare and
//! increment happen atomically on the server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Connection, Pool, Runtime};

use domains::{
    DomainError, RateLimitDecision, RateLimitPolicies, RateLimitRecord, RateLimiter, Result,
    DAY_SECS, HOUR_SECS,
};

use super::record_key;

const KEY_PREFIX: &str = "moments:ratelimit";

/// KEYS[1] = record hash
/// ARGV = now_ms, hour_ms, day_ms, hourly ceiling, daily ceiling
/// Returns {allowed, hour_count, hour_reset_ms, day_count, day_reset_ms}.
const CHECK_SCRIPT: &str = r#"
local now = tonumber(ARGV[1])
local hour_ms = tonumber(ARGV[2])
local day_ms = tonumber(ARGV[3])
local v = redis.call('HMGET', KEYS[1], 'hc', 'hr', 'dc', 'dr')
local hc = tonumber(v[1]) or 0
local hr = tonumber(v[2]) or (now + hour_ms)
local dc = tonumber(v[3]) or 0
local dr = tonumber(v[4]) or (now + day_ms)
if now >= hr then hc = 0; hr = now + hour_ms end
if now >= dr then dc = 0; dr = now + day_ms end
if hc >= tonumber(ARGV[4]) or dc >= tonumber(ARGV[5]) then
  return {0, hc, hr, dc, dr}
end
hc = hc + 1
dc = dc + 1
redis.call('HSET', KEYS[1], 'hc', hc, 'hr', hr, 'dc', dc, 'dr', dr)
redis.call('PEXPIREAT', KEYS[1], dr)
return {1, hc, hr, dc, dr}
"#;

pub struct RedisRateLimiter {
    pool: Pool,
    policies: RateLimitPolicies,
}

impl RedisRateLimiter {
    pub fn new(url: &str, pool_size: usize, policies: RateLimitPolicies) -> Result<Self> {
        let pool = Config::from_url(url)
            .builder()
            .map(|b| b.max_size(pool_size).runtime(Runtime::Tokio1).build())
            .map_err(|e| DomainError::Configuration(format!("invalid redis url: {e}")))?
            .map_err(|e| DomainError::Configuration(format!("failed to build redis pool: {e}")))?;
        Ok(Self { pool, policies })
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| DomainError::data("failed to get redis connection", e))
    }

    fn key(namespace: &str, identity: &str) -> String {
        format!("{KEY_PREFIX}:{}", record_key(namespace, identity))
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DomainError::data("rate limit reset out of range", format!("{ms}")))
}

fn count(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, identity: &str, namespace: &str) -> Result<RateLimitDecision> {
        let policy = self.policies.for_namespace(namespace);
        let now = Utc::now();
        let mut conn = self.conn().await?;

        let (allowed, hc, hr, dc, dr): (i64, i64, i64, i64, i64) = cmd("EVAL")
            .arg(CHECK_SCRIPT)
            .arg(1)
            .arg(Self::key(namespace, identity))
            .arg(now.timestamp_millis())
            .arg(HOUR_SECS * 1000)
            .arg(DAY_SECS * 1000)
            .arg(policy.hourly)
            .arg(policy.daily)
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::data("rate limit script failed", e))?;

        let record = RateLimitRecord::from_parts(count(hc), from_millis(hr)?, count(dc), from_millis(dr)?);
        Ok(if allowed == 1 {
            record.granted(now, policy)
        } else {
            record
                .denial(now, policy)
                .unwrap_or_else(|| record.granted(now, policy))
        })
    }

    async fn status(&self, identity: &str, namespace: &str) -> Result<RateLimitDecision> {
        let policy = self.policies.for_namespace(namespace);
        let now = Utc::now();
        let mut conn = self.conn().await?;

        let stored: Vec<Option<i64>> = cmd("HMGET")
            .arg(Self::key(namespace, identity))
            .arg(&["hc", "hr", "dc", "dr"])
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::data("failed to read rate limit record", e))?;

        match stored.as_slice() {
            [Some(hc), Some(hr), Some(dc), Some(dr)] => {
                let record =
                    RateLimitRecord::from_parts(count(*hc), from_millis(*hr)?, count(*dc), from_millis(*dr)?);
                Ok(record.peek(now, policy))
            }
            _ => Ok(RateLimitDecision::fresh(policy)),
        }
    }

    async fn clear(&self, identity: &str, namespace: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        cmd("DEL")
            .arg(Self::key(namespace, identity))
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| DomainError::data("failed to clear rate limit record", e))
    }
}
