//! Public intake and the curator review queue.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use domains::{namespaces, DomainError, SubmissionStatus};
use services::{ApprovalInput, SubmissionInput};

use crate::error::{ApiError, ApiResult};
use crate::extract::{AdminAccess, ClientIp};
use crate::state::AppState;

use super::count_denial;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectBody {
    #[serde(alias = "note")]
    pub review_note: Option<String>,
}

/// Unparseable ids can never match a stored submission.
fn submission_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| DomainError::not_found("submission", raw).into())
}

/// `POST /api/submissions`
pub async fn create(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    payload: Result<Json<SubmissionInput>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(input) = payload?;

    let result = state.submissions.submit(&ip, input).await;
    count_denial(&state, namespaces::SUBMISSION, &result);
    let receipt = result?;

    if receipt.trapped {
        state.metrics.submissions_trapped.inc();
    } else {
        state.metrics.submissions_received.inc();
    }
    Ok(Json(json!({ "success": true, "id": receipt.id })))
}

/// `GET /api/submissions?status=`
pub async fn list(
    _: AdminAccess,
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(params) = params?;
    let status = params
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<SubmissionStatus>)
        .transpose()?;

    let queue = state.submissions.list(status).await?;
    Ok(Json(json!(queue)))
}

/// `GET /api/submissions/{id}`
pub async fn get(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let submission = state.submissions.get(submission_id(&id)?).await?;
    Ok(Json(json!(submission)))
}

/// `POST /api/submissions/{id}/approve`
pub async fn approve(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ApprovalInput>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let id = submission_id(&id)?;
    let Json(input) = payload?;

    let outcome = state.submissions.approve(id, input).await?;
    state.metrics.submissions_approved.inc();
    Ok(Json(json!({
        "success": true,
        "momentId": outcome.moment.id,
        "momentSlug": outcome.moment.slug,
        "submission": outcome.submission,
    })))
}

/// `POST /api/submissions/{id}/reject`
///
/// The body is optional; an empty one rejects without a note.
pub async fn reject(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let id = submission_id(&id)?;
    let RejectBody { review_note } = if body.is_empty() {
        RejectBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))?
    };

    state.submissions.reject(id, review_note).await?;
    state.metrics.submissions_rejected.inc();
    Ok(Json(json!({ "success": true, "deleted": id })))
}
