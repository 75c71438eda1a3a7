//! # Submission lifecycle
//!
//! Public intake (rate limit, honeypot, validation) and the curator's
//! approve/reject decisions. A submission only ever leaves `Pending` once.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use domains::{
    namespaces, ColorExtractor, DomainError, MediaStore, Moment, MomentRepository, NewMoment,
    NewSubmission, RateLimitDecision, RateLimiter, Result, Submission, SubmissionRepository,
    SubmissionStatus,
};

use crate::slug::unique_slug;
use crate::validation::{
    normalize_tags, optional_text, optional_url, required_category, required_text, required_url,
    validate_year, TagsInput, MAX_CREATOR_NAME_LENGTH, MAX_DESCRIPTION_LENGTH, MAX_NOTE_LENGTH,
    MAX_TITLE_LENGTH,
};

/// Insert attempts when a concurrent approval claims the slug first.
const APPROVE_ATTEMPTS: u32 = 3;

/// Raw public submission form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionInput {
    #[serde(alias = "imageUrl")]
    pub media_url: Option<String>,
    pub source_url: Option<String>,
    pub creator_name: Option<String>,
    pub creator_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub submitter_note: Option<String>,
    /// Hidden form field; real visitors leave it empty.
    #[serde(alias = "website")]
    pub honeypot: Option<String>,
}

impl SubmissionInput {
    fn is_trap(&self) -> bool {
        self.honeypot.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    fn validate(self, submitter_ip: &str) -> Result<NewSubmission> {
        Ok(NewSubmission {
            media_url: required_url(self.media_url.as_deref(), "media URL")?,
            source_url: required_url(self.source_url.as_deref(), "source URL")?,
            creator_name: required_text(
                self.creator_name.as_deref(),
                "creator name",
                MAX_CREATOR_NAME_LENGTH,
            )?,
            creator_url: optional_url(self.creator_url.as_deref(), "creator URL")?,
            title: optional_text(self.title.as_deref(), "title", MAX_TITLE_LENGTH)?,
            description: optional_text(
                self.description.as_deref(),
                "description",
                MAX_DESCRIPTION_LENGTH,
            )?,
            submitter_note: optional_text(self.submitter_note.as_deref(), "note", MAX_NOTE_LENGTH)?,
            submitter_ip: submitter_ip.to_string(),
        })
    }
}

/// What the submitter gets back. Trapped bots receive an indistinguishable
/// receipt with an id that was never stored.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub id: Uuid,
    #[serde(skip)]
    pub trapped: bool,
    #[serde(skip)]
    pub quota: RateLimitDecision,
}

/// Curator-supplied editorial fields for the Moment created on approval.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalInput {
    pub title: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub tags: Option<TagsInput>,
    pub year: Option<i32>,
    #[serde(default)]
    pub year_approximate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalOutcome {
    pub submission: Submission,
    pub moment: Moment,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionQueue {
    pub submissions: Vec<Submission>,
    pub pending_count: u64,
}

pub struct SubmissionService {
    submissions: Arc<dyn SubmissionRepository>,
    moments: Arc<dyn MomentRepository>,
    media: Arc<dyn MediaStore>,
    colors: Arc<dyn ColorExtractor>,
    limiter: Arc<dyn RateLimiter>,
}

impl SubmissionService {
    pub fn new(
        submissions: Arc<dyn SubmissionRepository>,
        moments: Arc<dyn MomentRepository>,
        media: Arc<dyn MediaStore>,
        colors: Arc<dyn ColorExtractor>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            submissions,
            moments,
            media,
            colors,
            limiter,
        }
    }

    /// Public intake. The quota is consumed before anything else so that
    /// trapped and invalid attempts count against the sender too.
    #[instrument(skip(self, input))]
    pub async fn submit(&self, client_ip: &str, input: SubmissionInput) -> Result<SubmissionReceipt> {
        let quota = self.limiter.check(client_ip, namespaces::SUBMISSION).await?;
        if !quota.allowed {
            return Err(DomainError::RateLimited(quota));
        }

        if input.is_trap() {
            debug!("honeypot filled; discarding submission");
            return Ok(SubmissionReceipt {
                id: Uuid::now_v7(),
                trapped: true,
                quota,
            });
        }

        let submission = self.submissions.create(input.validate(client_ip)?).await?;
        info!(submission_id = %submission.id, "submission received");
        Ok(SubmissionReceipt {
            id: submission.id,
            trapped: false,
            quota,
        })
    }

    pub async fn list(&self, status: Option<SubmissionStatus>) -> Result<SubmissionQueue> {
        let submissions = self.submissions.list(status).await?;
        let pending_count = self.submissions.count_by_status(SubmissionStatus::Pending).await?;
        Ok(SubmissionQueue {
            submissions,
            pending_count,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<Submission> {
        self.submissions
            .find(id)
            .await?
            .ok_or_else(|| DomainError::not_found("submission", id))
    }

    /// Publishes a pending submission as a Moment. The repository writes the
    /// Moment and the status change together, so a failure leaves both untouched.
    #[instrument(skip(self, input))]
    pub async fn approve(&self, id: Uuid, input: ApprovalInput) -> Result<ApprovalOutcome> {
        let submission = self.pending(id).await?;

        let title = required_text(input.title.as_deref(), "title", MAX_TITLE_LENGTH)?;
        let category = required_category(input.category.as_deref())?;
        let description = required_text(
            input.description.as_deref(),
            "description",
            MAX_DESCRIPTION_LENGTH,
        )?;
        let tags = normalize_tags(input.tags.map(TagsInput::into_vec).unwrap_or_default())?;
        let year = validate_year(input.year)?;
        let dominant_color = self.colors.extract(&submission.media_url).await;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let slug = unique_slug(self.moments.as_ref(), &title).await?;
            let moment = NewMoment {
                slug,
                title: title.clone(),
                category,
                description: description.clone(),
                creator_name: Some(submission.creator_name.clone()),
                creator_url: submission.creator_url.clone(),
                source_url: submission.source_url.clone(),
                media_url: submission.media_url.clone(),
                tags: tags.clone(),
                dominant_color: Some(dominant_color.clone()),
                year,
                year_approximate: input.year_approximate,
                published_at: Utc::now(),
            };

            match self.submissions.approve(id, moment).await {
                Ok((submission, moment)) => {
                    info!(submission_id = %id, slug = %moment.slug, "submission approved");
                    return Ok(ApprovalOutcome { submission, moment });
                }
                Err(DomainError::SlugTaken(slug)) if attempt < APPROVE_ATTEMPTS => {
                    warn!(submission_id = %id, %slug, attempt, "slug claimed concurrently; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Rejects and purges a pending submission. The review note survives only
    /// in the log record emitted here.
    ///
    /// A submission left `Rejected` by an interrupted purge is purged again
    /// rather than refused, so retrying always ends with the row gone.
    #[instrument(skip(self, note))]
    pub async fn reject(&self, id: Uuid, note: Option<String>) -> Result<Submission> {
        let submission = self.get(id).await?;
        let rejected = match submission.status {
            SubmissionStatus::Pending => {
                let note = optional_text(note.as_deref(), "review note", MAX_NOTE_LENGTH)?;
                self.submissions.mark_rejected(id, note).await?
            }
            SubmissionStatus::Rejected => {
                warn!(submission_id = %id, "finishing purge of an already rejected submission");
                submission
            }
            status => return Err(DomainError::AlreadyReviewed(status)),
        };

        if let Err(err) = self.media.delete(&rejected.media_url).await {
            warn!(submission_id = %id, error = %err, "failed to delete submission media; continuing");
        }

        self.submissions.delete(id).await?;
        info!(
            submission_id = %id,
            submitter_ip = %rejected.submitter_ip,
            review_note = rejected.review_note.as_deref().unwrap_or(""),
            "submission rejected and deleted"
        );
        Ok(rejected)
    }

    async fn pending(&self, id: Uuid) -> Result<Submission> {
        let submission = self.get(id).await?;
        if submission.status.is_terminal() {
            return Err(DomainError::AlreadyReviewed(submission.status));
        }
        Ok(submission)
    }
}
