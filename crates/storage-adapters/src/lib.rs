//! # storage-adapters
//!
//! Implementations of the persistence, media, rate limiting and colour
//! ports defined in `domains`. Backends are chosen with cargo features.

pub mod color;
pub mod media;
pub mod rate_limit;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use color::DominantColorExtractor;
pub use media::LocalMediaStore;
pub use rate_limit::InMemoryRateLimiter;
#[cfg(feature = "redis")]
pub use rate_limit::RedisRateLimiter;
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteArchive;
