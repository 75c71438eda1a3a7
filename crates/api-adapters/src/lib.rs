//! # api-adapters
//!
//! The HTTP surface of the archive: routes, extractors, error mapping and
//! metrics. Handlers stay thin and call into `services`.

pub mod metrics;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod middleware;
#[cfg(feature = "web-axum")]
pub mod state;

pub use metrics::Metrics;

#[cfg(feature = "web-axum")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "web-axum")]
pub use state::AppState;

#[cfg(feature = "web-axum")]
mod routes {
    use std::path::PathBuf;

    use axum::extract::DefaultBodyLimit;
    use axum::routing::{delete, get, post};
    use axum::Router;
    use tower_http::compression::CompressionLayer;
    use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
    use tower_http::services::ServeDir;
    use tower_http::trace::TraceLayer;
    use tracing::warn;

    use crate::handlers::{meta, moments, submissions, uploads};
    use crate::middleware::{cors_policy, request_span, REQUEST_ID_HEADER};
    use crate::state::AppState;

    /// Room for multipart boundaries and headers on top of the file itself.
    const MULTIPART_OVERHEAD: usize = 64 * 1024;

    /// Router settings that are not part of the handler state.
    #[derive(Debug, Clone, Default)]
    pub struct HttpOptions {
        /// Directory served under `media_prefix`; `None` disables static media.
        pub media_root: Option<PathBuf>,
        pub media_prefix: String,
        pub cors_origins: Vec<String>,
    }

    pub fn router(state: AppState, options: &HttpOptions) -> Router {
        let uploads = Router::new()
            .route("/api/upload", post(uploads::admin_upload))
            .route("/api/upload/public", post(uploads::public_upload))
            .layer(DefaultBodyLimit::max(state.media.max_bytes() + MULTIPART_OVERHEAD));

        let api = Router::new()
            .route("/api/submissions", post(submissions::create).get(submissions::list))
            .route("/api/submissions/{id}", get(submissions::get))
            .route("/api/submissions/{id}/approve", post(submissions::approve))
            .route("/api/submissions/{id}/reject", post(submissions::reject))
            .route(
                "/api/moments",
                get(moments::list)
                    .post(moments::create)
                    .delete(moments::delete_many),
            )
            .route(
                "/api/moments/{slug}",
                get(moments::detail)
                    .patch(moments::update)
                    .delete(moments::delete),
            )
            .route("/api/categories", get(moments::categories))
            .route("/api/rate-limit/{namespace}", get(meta::rate_limit_status))
            .route(
                "/api/rate-limit/{namespace}/{identity}",
                delete(meta::clear_rate_limit),
            )
            .route("/healthz", get(meta::health))
            .route("/metrics", get(meta::metrics));

        let mut router = Router::new().merge(api).merge(uploads);

        if let Some(root) = &options.media_root {
            let prefix = options.media_prefix.trim_end_matches('/');
            if prefix.is_empty() {
                warn!("media prefix is empty; static media will not be served");
            } else {
                router = router.nest_service(prefix, ServeDir::new(root));
            }
        }

        router
            .with_state(state)
            .layer(CompressionLayer::new())
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(cors_policy(&options.cors_origins))
    }
}

#[cfg(feature = "web-axum")]
pub use routes::{router, HttpOptions};
