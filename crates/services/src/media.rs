//! Upload intake for the admin and public upload endpoints.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use domains::{namespaces, DomainError, MediaStore, RateLimitDecision, RateLimiter, Result};

use crate::validation::{validate_upload, MAX_UPLOAD_BYTES};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

pub struct MediaService {
    store: Arc<dyn MediaStore>,
    limiter: Arc<dyn RateLimiter>,
    max_bytes: usize,
}

impl MediaService {
    pub fn new(store: Arc<dyn MediaStore>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            store,
            limiter,
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Consumes one unit of the public upload quota. Called before the body
    /// is read so abusive clients are turned away cheaply.
    pub async fn admit(&self, client_ip: &str) -> Result<RateLimitDecision> {
        let quota = self.limiter.check(client_ip, namespaces::UPLOAD).await?;
        if !quota.allowed {
            return Err(DomainError::RateLimited(quota));
        }
        Ok(quota)
    }

    pub async fn store(&self, content_type: Option<&str>, data: Bytes) -> Result<UploadReceipt> {
        let mime = validate_upload(content_type, data.len(), self.max_bytes)?;
        let size = data.len();
        let url = self.store.upload(data, &mime).await?;
        info!(%url, content_type = %mime, size, "media stored");
        Ok(UploadReceipt {
            url,
            content_type: mime.essence_str().to_string(),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockMediaStore, MockRateLimiter, RateLimitPolicy};
    use tokio_test::{assert_err, assert_ok};

    fn service(store: MockMediaStore, limiter: MockRateLimiter) -> MediaService {
        MediaService::new(Arc::new(store), Arc::new(limiter))
    }

    #[tokio::test]
    async fn stores_allowed_media() {
        let mut store = MockMediaStore::new();
        store
            .expect_upload()
            .withf(|data, mime| data.len() == 4 && mime.essence_str() == "image/png")
            .returning(|_, _| Ok("/media/ab/cd/abcd.png".into()));

        let receipt = assert_ok!(
            service(store, MockRateLimiter::new())
                .store(Some("image/png"), Bytes::from_static(b"\x89PNG"))
                .await
        );
        assert_eq!(receipt.url, "/media/ab/cd/abcd.png");
        assert_eq!(receipt.size, 4);
    }

    #[tokio::test]
    async fn rejects_disallowed_type_before_storing() {
        let mut store = MockMediaStore::new();
        store.expect_upload().never();
        let err = assert_err!(
            service(store, MockRateLimiter::new())
                .store(Some("application/pdf"), Bytes::from_static(b"%PDF"))
                .await
        );
        assert!(err.to_string().contains("invalid file type"));
    }

    #[tokio::test]
    async fn enforces_configured_size_limit() {
        let mut store = MockMediaStore::new();
        store.expect_upload().never();
        let svc = service(store, MockRateLimiter::new()).with_max_bytes(2);
        assert_err!(svc.store(Some("image/gif"), Bytes::from_static(b"GIF8")).await);
    }

    #[tokio::test]
    async fn admit_uses_the_upload_namespace() {
        let mut limiter = MockRateLimiter::new();
        limiter
            .expect_check()
            .withf(|ip, ns| ip == "192.0.2.4" && ns == namespaces::UPLOAD)
            .returning(|_, _| {
                let mut d = RateLimitDecision::fresh(RateLimitPolicy::default());
                d.allowed = false;
                d.remaining_hour = 0;
                Ok(d)
            });
        let err = assert_err!(service(MockMediaStore::new(), limiter).admit("192.0.2.4").await);
        assert!(matches!(err, DomainError::RateLimited(_)));
    }
}
