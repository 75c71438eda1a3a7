//! Rate limiter adapters: a process-local map for single-instance
//! deployments and a Redis-backed store shared across instances.

mod in_memory;
#[cfg(feature = "redis")]
mod redis;

pub use in_memory::InMemoryRateLimiter;
#[cfg(feature = "redis")]
pub use redis::RedisRateLimiter;

fn record_key(namespace: &str, identity: &str) -> String {
    format!("{namespace}:{identity}")
}
