//! Multipart media uploads.

use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::{json, Value};

use domains::{namespaces, DomainError};
use services::UploadReceipt;

use crate::error::ApiResult;
use crate::extract::{AdminAccess, ClientIp};
use crate::state::AppState;

use super::count_denial;

const FILE_FIELD: &str = "file";

/// Reads the `file` part and hands it to the media service.
async fn store_file(state: &AppState, mut form: Multipart) -> ApiResult<UploadReceipt> {
    while let Some(field) = form.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        let receipt = state.media.store(content_type.as_deref(), data).await?;
        state.metrics.uploads_stored.inc();
        return Ok(receipt);
    }
    Err(DomainError::Validation("no file provided".into()).into())
}

/// `POST /api/upload`
pub async fn admin_upload(
    _: AdminAccess,
    State(state): State<AppState>,
    form: Multipart,
) -> ApiResult<Json<UploadReceipt>> {
    Ok(Json(store_file(&state, form).await?))
}

/// `POST /api/upload/public`
///
/// The quota is charged before the body is read.
pub async fn public_upload(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    form: Multipart,
) -> ApiResult<Json<Value>> {
    let admitted = state.media.admit(&ip).await;
    count_denial(&state, namespaces::UPLOAD, &admitted);
    let quota = admitted?;

    let receipt = store_file(&state, form).await?;
    Ok(Json(json!({
        "url": receipt.url,
        "contentType": receipt.content_type,
        "size": receipt.size,
        "remaining": {
            "hour": quota.remaining_hour,
            "day": quota.remaining_day,
        },
    })))
}
