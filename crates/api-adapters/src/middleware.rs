//! Cross-cutting HTTP layers.

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Method, Request};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info_span, warn, Span};

use crate::extract::ADMIN_HEADER;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// No origins means same-origin only; `"*"` opens the API to any origin.
pub fn cors_policy(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(ADMIN_HEADER)]);

    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        base
    } else {
        base.allow_origin(AllowOrigin::list(allowed))
    }
}

/// Request span carrying the id assigned by `SetRequestIdLayer`.
pub fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    info_span!(
        "http",
        method = %request.method(),
        uri = %request.uri(),
        request_id,
    )
}
