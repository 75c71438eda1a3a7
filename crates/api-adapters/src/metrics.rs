//! Prometheus counters for the archive's public intake.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Prometheus text exposition format content type.
pub const PROMETHEUS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NamespaceLabels {
    pub namespace: String,
}

/// Label values are limited to the configured limiter namespaces; identities
/// never become labels.
#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    pub submissions_received: Counter,
    pub submissions_trapped: Counter,
    pub submissions_approved: Counter,
    pub submissions_rejected: Counter,
    pub uploads_stored: Counter,
    pub rate_limit_denials: Family<NamespaceLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("moments");

        let submissions_received = Counter::default();
        let submissions_trapped = Counter::default();
        let submissions_approved = Counter::default();
        let submissions_rejected = Counter::default();
        let uploads_stored = Counter::default();
        let rate_limit_denials = Family::<NamespaceLabels, Counter>::default();

        registry.register(
            "submissions_received",
            "Submissions accepted into the review queue",
            submissions_received.clone(),
        );
        registry.register(
            "submissions_trapped",
            "Submissions silently dropped by the honeypot",
            submissions_trapped.clone(),
        );
        registry.register(
            "submissions_approved",
            "Submissions published as moments",
            submissions_approved.clone(),
        );
        registry.register(
            "submissions_rejected",
            "Submissions rejected by a curator",
            submissions_rejected.clone(),
        );
        registry.register("uploads_stored", "Media files written to the store", uploads_stored.clone());
        registry.register(
            "rate_limit_denials",
            "Requests refused by the rate limiter",
            rate_limit_denials.clone(),
        );

        Self {
            registry,
            submissions_received,
            submissions_trapped,
            submissions_approved,
            submissions_rejected,
            uploads_stored,
            rate_limit_denials,
        }
    }

    pub fn record_denial(&self, namespace: &str) {
        self.rate_limit_denials
            .get_or_create(&NamespaceLabels {
                namespace: namespace.to_string(),
            })
            .inc();
    }

    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_prefixed_counters() {
        let metrics = Metrics::new();
        metrics.submissions_received.inc();
        metrics.record_denial("submission");
        metrics.record_denial("submission");

        let text = metrics.render().unwrap();
        assert!(text.contains("moments_submissions_received_total 1"));
        assert!(text.contains("moments_rate_limit_denials_total{namespace=\"submission\"} 2"));
        assert!(text.ends_with("# EOF\n"));
    }
}
