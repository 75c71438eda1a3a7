//! # DomainError
//!
//! Failures shared by the services and adapters. Each variant corresponds to
//! one HTTP status in the API layer; `Data` keeps its source for the logs.

use thiserror::Error;

use crate::models::SubmissionStatus;
use crate::rate_limit::RateLimitDecision;

/// Error returned by every archive operation.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed or missing input (e.g., bad URL, unknown category, too many tags)
    #[error("validation error: {0}")]
    Validation(String),

    /// Another Moment already owns this slug
    #[error("a moment with slug '{0}' already exists")]
    SlugTaken(String),

    /// Resource not found (e.g., Submission, Moment)
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The submission has left `Pending` and can no longer be reviewed
    #[error("submission already {}", .0.label())]
    AlreadyReviewed(SubmissionStatus),

    /// Quota exhausted; carries the data a client needs to back off
    #[error("too many requests: {}", .0.reason.as_deref().unwrap_or("rate limit exceeded"))]
    RateLimited(RateLimitDecision),

    /// Admin credentials missing or wrong
    #[error("unauthorized")]
    Unauthorized,

    /// The server itself is misconfigured (e.g., no admin secret set)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Infrastructure failure (e.g., DB down, media store I/O). The source is
    /// kept for logs and never shown to callers.
    #[error("data layer failure: {context}")]
    Data {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DomainError {
    pub fn data(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        DomainError::Data {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for errors the caller can correct; these are never retried.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            DomainError::Data { .. } | DomainError::Configuration(_)
        )
    }
}

/// A specialized Result type for domain logic.
pub type Result<T> = std::result::Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn already_reviewed_names_the_status() {
        let err = DomainError::AlreadyReviewed(SubmissionStatus::Approved);
        assert_eq!(err.to_string(), "submission already approved");
    }

    #[test]
    fn data_error_preserves_cause_but_not_in_message() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = DomainError::data("failed to insert moment", cause);
        assert_eq!(err.to_string(), "data layer failure: failed to insert moment");
        assert_eq!(err.source().unwrap().to_string(), "disk on fire");
        assert!(!err.is_client_error());
    }

    #[test]
    fn not_found_formats_entity_and_id() {
        let err = DomainError::not_found("moment", "my-slug");
        assert_eq!(err.to_string(), "moment not found: my-slug");
        assert!(err.is_client_error());
    }
}
