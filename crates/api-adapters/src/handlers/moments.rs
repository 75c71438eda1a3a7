//! Gallery reads and curator edits.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use services::{MomentInput, MomentPatch, MomentQuery};

use crate::error::ApiResult;
use crate::extract::AdminAccess;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BulkDelete {
    pub slugs: Vec<String>,
}

/// `GET /api/moments?category=&search=`
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<MomentQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let moments = state.moments.list(query).await?;
    Ok(Json(json!({ "moments": moments })))
}

/// `GET /api/moments/{slug}`
pub async fn detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Value>> {
    let detail = state.moments.detail(&slug).await?;
    Ok(Json(json!(detail)))
}

/// `POST /api/moments`
pub async fn create(
    _: AdminAccess,
    State(state): State<AppState>,
    payload: Result<Json<MomentInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(input) = payload?;
    let moment = state.moments.create(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "moment": moment })),
    ))
}

/// `PATCH /api/moments/{slug}`
pub async fn update(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(slug): Path<String>,
    payload: Result<Json<MomentPatch>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(patch) = payload?;
    let moment = state.moments.update(&slug, patch).await?;
    Ok(Json(json!({ "success": true, "moment": moment })))
}

/// `DELETE /api/moments/{slug}`
pub async fn delete(
    _: AdminAccess,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Value>> {
    state.moments.delete(&slug).await?;
    Ok(Json(json!({ "success": true, "deleted": slug })))
}

/// `DELETE /api/moments` with `{ "slugs": [...] }`
pub async fn delete_many(
    _: AdminAccess,
    State(state): State<AppState>,
    payload: Result<Json<BulkDelete>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(BulkDelete { slugs }) = payload?;
    let deleted = state.moments.delete_many(&slugs).await?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

/// `GET /api/categories`
pub async fn categories(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "categories": state.moments.categories() }))
}
