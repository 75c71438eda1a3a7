//! # SQLite archive
//!
//! Maps the `moments` and `submissions` tables onto the domain models.
//! UUIDs are stored as 16-byte BLOBs, tags as a JSON array and timestamps as
//! fixed-width RFC 3339 text so that `ORDER BY` on them is chronological.

mod moments;
mod submissions;

use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite};
use tracing::{info, warn};
use uuid::Uuid;

use domains::{DomainError, Result};

/// Implements both `MomentRepository` and `SubmissionRepository` over one pool,
/// so approval can write to both tables in a single transaction.
#[derive(Clone)]
pub struct SqliteArchive {
    pool: SqlitePool,
}

impl SqliteArchive {
    /// Opens (and creates if needed) the database at `url`.
    ///
    /// In-memory databases are pinned to one long-lived connection; every
    /// new connection would otherwise see a different, empty database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");

        let mut options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DomainError::data("invalid database url", e))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DomainError::data("failed to open database", e))?;
        info!(in_memory, "database connected");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::data("failed to run migrations", e))
    }

    /// Liveness probe used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(db_err("database ping failed"))
    }
}

// ids are stored as their 16 raw bytes
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(blob).map_err(|e| DomainError::data("malformed id column", e))
}

/// Current time at the precision the timestamp columns keep, so values handed
/// back from a write equal what a later read returns.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DomainError::data(format!("malformed timestamp '{raw}'"), e))
}

fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).map_err(|e| DomainError::data("failed to encode tags", e))
}

/// Reads the stored tag column. Anything that is not a JSON array yields no
/// tags, and non-string entries are dropped.
pub(crate) fn decode_tags(raw: &str) -> Vec<String> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(tag) => Some(tag),
                _ => None,
            })
            .collect(),
        Ok(_) => Vec::new(),
        Err(err) => {
            warn!(error = %err, "unreadable tags column; treating as empty");
            Vec::new()
        }
    }
}

/// Typed column read that reports the column name on failure.
fn get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column)
        .map_err(|e| DomainError::data(format!("failed to read column '{column}'"), e))
}

fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |err| DomainError::data(context, err)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
pub(crate) async fn test_archive() -> SqliteArchive {
    let archive = SqliteArchive::connect("sqlite::memory:", 1)
        .await
        .expect("in-memory database");
    archive.migrate().await.expect("migrations apply");
    archive
}
