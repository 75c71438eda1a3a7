use std::sync::Arc;

use domains::{AdminGate, RateLimitPolicies, RateLimiter};
use services::{MediaService, MomentService, SubmissionService};

use crate::metrics::Metrics;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub submissions: Arc<SubmissionService>,
    pub moments: Arc<MomentService>,
    pub media: Arc<MediaService>,
    /// Used directly only by the read-only quota status endpoint.
    pub limiter: Arc<dyn RateLimiter>,
    /// Namespaces the status endpoint will report on.
    pub policies: RateLimitPolicies,
    pub admin: Arc<dyn AdminGate>,
    pub metrics: Arc<Metrics>,
    /// Whether forwarding headers may name the client; otherwise only the
    /// socket peer counts.
    pub trust_proxy_headers: bool,
}
