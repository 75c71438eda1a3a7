//! # Ports
//!
//! Storage, media, colour, rate-limit and admin seams. Services hold them as
//! `Arc<dyn _>`; `cmd/moments` picks the implementations.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mime::Mime;
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::errors::Result;
use crate::models::{
    Adjacent, Category, Moment, MomentUpdate, NewMoment, NewSubmission, Submission,
    SubmissionStatus,
};
use crate::rate_limit::RateLimitDecision;

/// Persistence contract for published Moments.
///
/// Implementations must enforce slug uniqueness as a hard constraint and
/// report collisions as `DomainError::SlugTaken`.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MomentRepository: Send + Sync {
    async fn create(&self, moment: NewMoment) -> Result<Moment>;
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Moment>>;
    /// Fast-path check only; the unique constraint is the real guarantee.
    async fn slug_exists(&self, slug: &str) -> Result<bool>;
    /// Newest first, optionally restricted to one category.
    async fn list(&self, category: Option<Category>) -> Result<Vec<Moment>>;
    /// Returns `None` when no Moment has this slug.
    async fn update(&self, slug: &str, changes: MomentUpdate) -> Result<Option<Moment>>;
    async fn delete(&self, slug: &str) -> Result<bool>;
    async fn delete_many(&self, slugs: &[String]) -> Result<u64>;

    // Related-content candidate pools, newest first
    async fn recent_in_category(&self, category: Category, exclude: Uuid, limit: u32) -> Result<Vec<Moment>>;
    async fn recent_outside_category(&self, category: Category, exclude: Uuid, limit: u32) -> Result<Vec<Moment>>;

    /// Strict predecessor and successor by `published_at`, with `id` breaking
    /// ties between equal timestamps.
    async fn adjacent(&self, published_at: DateTime<Utc>, id: Uuid) -> Result<Adjacent>;
}

/// Persistence contract for the submission queue.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    async fn create(&self, submission: NewSubmission) -> Result<Submission>;
    async fn find(&self, id: Uuid) -> Result<Option<Submission>>;
    /// Newest first.
    async fn list(&self, status: Option<SubmissionStatus>) -> Result<Vec<Submission>>;
    async fn count_by_status(&self, status: SubmissionStatus) -> Result<u64>;

    /// Atomic operation: insert the Moment and flip the submission to
    /// `Approved` with `moment_id` set. Nothing is written unless both
    /// succeed and the submission was still `Pending`.
    async fn approve(&self, id: Uuid, moment: NewMoment) -> Result<(Submission, Moment)>;

    /// Flip a `Pending` submission to `Rejected`.
    async fn mark_rejected(&self, id: Uuid, review_note: Option<String>) -> Result<Submission>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// Media storage contract for uploads.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Saves raw bytes and returns the public URL.
    async fn upload(&self, data: Bytes, content_type: &Mime) -> Result<String>;
    /// Removes a previously uploaded file. URLs the store does not own are ignored.
    async fn delete(&self, url: &str) -> Result<()>;
}

/// Derives a display colour from a media URL.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ColorExtractor: Send + Sync {
    /// Never fails: any problem degrades to `FALLBACK_DOMINANT_COLOR`.
    async fn extract(&self, media_url: &str) -> String;
}

/// Per-identity quota tracking.
///
/// `check` is a single atomic check-and-increment per identity × namespace.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, identity: &str, namespace: &str) -> Result<RateLimitDecision>;
    /// Read-only pre-flight status; consumes nothing.
    async fn status(&self, identity: &str, namespace: &str) -> Result<RateLimitDecision>;
    async fn clear(&self, identity: &str, namespace: &str) -> Result<()>;
}

/// Curator authentication contract.
pub trait AdminGate: Send + Sync {
    /// `presented` is the raw credential from the request, if any.
    fn authorize(&self, presented: Option<&str>) -> Result<()>;
}
