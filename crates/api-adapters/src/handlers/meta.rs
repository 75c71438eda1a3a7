use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info};

use domains::{DomainError, RateLimitDecision};

use crate::error::ApiResult;
use crate::extract::{AdminAccess, ClientIp};
use crate::metrics::PROMETHEUS_CONTENT_TYPE;
use crate::state::AppState;

fn known_namespace(state: &AppState, namespace: &str) -> ApiResult<()> {
    if state.policies.is_known(namespace) {
        Ok(())
    } else {
        Err(DomainError::not_found("rate limit namespace", namespace).into())
    }
}

/// `GET /api/rate-limit/{namespace}`: the caller's remaining quota; consumes nothing.
pub async fn rate_limit_status(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Path(namespace): Path<String>,
) -> ApiResult<Json<RateLimitDecision>> {
    known_namespace(&state, &namespace)?;
    Ok(Json(state.limiter.status(&ip, &namespace).await?))
}

/// `DELETE /api/rate-limit/{namespace}/{identity}`: lifts a block early.
pub async fn clear_rate_limit(
    _: AdminAccess,
    State(state): State<AppState>,
    Path((namespace, identity)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    known_namespace(&state, &namespace)?;
    state.limiter.clear(&identity, &namespace).await?;
    info!(%namespace, %identity, "rate limit cleared by curator");
    Ok(Json(json!({ "success": true })))
}

/// `GET /healthz`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
