//! HTTP mapping for domain failures.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use domains::{DomainError, RateLimitDecision};

pub const REMAINING_HOUR_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining-hour");
pub const REMAINING_DAY_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining-day");

/// Everything a handler can fail with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The request could not be decoded (bad JSON, path or multipart body).
    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::BadRequest(format!("invalid form data: {}", err.body_text()))
    }
}

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(json!({ "error": text.into() }))).into_response()
}

fn rate_limited(decision: &RateLimitDecision) -> Response {
    let body = json!({
        "error": decision.reason.as_deref().unwrap_or("rate limit exceeded"),
        "remaining": {
            "hour": decision.remaining_hour,
            "day": decision.remaining_day,
        },
        "resetIn": {
            "hour": decision.reset_in_hour_secs,
            "day": decision.reset_in_day_secs,
        },
    });

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after_secs()),
    );
    headers.insert(REMAINING_HOUR_HEADER, HeaderValue::from(decision.remaining_hour));
    headers.insert(REMAINING_DAY_HEADER, HeaderValue::from(decision.remaining_day));
    response
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::BadRequest(msg) => return message(StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => err,
        };

        match &err {
            DomainError::Validation(msg) => message(StatusCode::BAD_REQUEST, msg.clone()),
            DomainError::SlugTaken(_) | DomainError::AlreadyReviewed(_) => {
                message(StatusCode::CONFLICT, err.to_string())
            }
            DomainError::NotFound { .. } => message(StatusCode::NOT_FOUND, err.to_string()),
            DomainError::RateLimited(decision) => rate_limited(decision),
            DomainError::Unauthorized => message(StatusCode::UNAUTHORIZED, "unauthorized"),
            DomainError::Configuration(detail) => {
                error!(%detail, "server misconfigured");
                message(StatusCode::INTERNAL_SERVER_ERROR, "server configuration error")
            }
            DomainError::Data { context, source } => {
                error!(%context, error = %source, "request failed in the data layer");
                message(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use domains::SubmissionStatus;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn status_of(err: DomainError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        assert_eq!(status_of(DomainError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(DomainError::SlugTaken("a".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(DomainError::not_found("moment", "a")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(DomainError::AlreadyReviewed(SubmissionStatus::Approved)),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(DomainError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(DomainError::Configuration("no secret".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn data_errors_hide_their_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "password=hunter2");
        let response = ApiError::from(DomainError::data("insert moment", cause)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "internal server error");
    }

    #[tokio::test]
    async fn rate_limited_carries_backoff_headers_and_body() {
        let decision = RateLimitDecision {
            allowed: false,
            remaining_hour: 0,
            remaining_day: 7,
            reset_in_hour_secs: 1200,
            reset_in_day_secs: 80000,
            reason: Some("hourly limit exceeded".into()),
        };
        let response = ApiError::from(DomainError::RateLimited(decision)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "1200");
        assert_eq!(response.headers()["x-ratelimit-remaining-hour"], "0");
        assert_eq!(response.headers()["x-ratelimit-remaining-day"], "7");

        let body = body_json(response).await;
        assert_eq!(body["error"], "hourly limit exceeded");
        assert_eq!(body["remaining"]["day"], 7);
        assert_eq!(body["resetIn"]["hour"], 1200);
    }
}
