//! Shared fixtures for the HTTP-level tests.
//!
//! Every `TestApp` owns a private in-memory database and media directory, so
//! tests can run in parallel without interfering.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use api_adapters::{router, AppState, HttpOptions, Metrics};
use auth_adapters::SharedSecretGate;
use domains::{namespaces, ColorExtractor, RateLimitPolicies, RateLimitPolicy};
use services::{MediaService, MomentService, SubmissionService};
use storage_adapters::{InMemoryRateLimiter, LocalMediaStore, SqliteArchive};

pub const ADMIN_SECRET: &str = "letmein";
pub const TEST_COLOR: &str = "#336699";

/// Colour extraction without network access.
pub struct FixedColor;

#[async_trait]
impl ColorExtractor for FixedColor {
    async fn extract(&self, _media_url: &str) -> String {
        TEST_COLOR.to_string()
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub router: Router,
    pub archive: Arc<SqliteArchive>,
    pub limiter: Arc<InMemoryRateLimiter>,
    pub metrics: Arc<Metrics>,
    pub media_dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_secret(Some(ADMIN_SECRET)).await
    }

    /// `None` simulates a server started without an admin secret.
    pub async fn with_secret(secret: Option<&str>) -> Self {
        Self::build(secret, true).await
    }

    /// A server exposed directly, where forwarding headers are not believed.
    pub async fn without_proxy() -> Self {
        Self::build(Some(ADMIN_SECRET), false).await
    }

    async fn build(secret: Option<&str>, trust_proxy_headers: bool) -> Self {
        let archive = Arc::new(
            SqliteArchive::connect("sqlite::memory:", 1)
                .await
                .expect("in-memory database"),
        );
        archive.migrate().await.expect("migrations apply");

        let media_dir = tempfile::tempdir().expect("temp media dir");
        let media_store = Arc::new(LocalMediaStore::new(media_dir.path(), "/media"));
        let colors = Arc::new(FixedColor);

        let policies = RateLimitPolicies::new(RateLimitPolicy::default())
            .with(namespaces::SUBMISSION, RateLimitPolicy { hourly: 3, daily: 10 })
            .with(namespaces::UPLOAD, RateLimitPolicy { hourly: 3, daily: 10 });
        let limiter = Arc::new(InMemoryRateLimiter::new(policies.clone()));
        let metrics = Arc::new(Metrics::new());

        let state = AppState {
            submissions: Arc::new(SubmissionService::new(
                archive.clone(),
                archive.clone(),
                media_store.clone(),
                colors.clone(),
                limiter.clone(),
            )),
            moments: Arc::new(MomentService::new(archive.clone(), colors)),
            media: Arc::new(MediaService::new(media_store, limiter.clone())),
            limiter: limiter.clone(),
            policies,
            admin: Arc::new(SharedSecretGate::new(
                secret.map(|s| SecretString::from(s.to_string())),
            )),
            metrics: metrics.clone(),
            trust_proxy_headers,
        };
        let options = HttpOptions {
            media_root: Some(media_dir.path().to_path_buf()),
            media_prefix: "/media".into(),
            cors_origins: Vec::new(),
        };

        Self {
            router: router(state, &options),
            archive,
            limiter,
            metrics,
            media_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(RequestBuilder::new(Method::GET, uri).build()).await
    }

    pub async fn admin_get(&self, uri: &str) -> TestResponse {
        self.send(RequestBuilder::new(Method::GET, uri).admin().build()).await
    }

    pub async fn admin_json(&self, method: Method, uri: &str, body: Value) -> TestResponse {
        self.send(RequestBuilder::new(method, uri).admin().json(body)).await
    }

    /// Public submission from `ip`.
    pub async fn submit(&self, ip: &str, body: Value) -> TestResponse {
        self.send(
            RequestBuilder::new(Method::POST, "/api/submissions")
                .client(ip)
                .json(body),
        )
        .await
    }
}

/// Small builder over `Request` for the headers these tests care about.
pub struct RequestBuilder {
    inner: axum::http::request::Builder,
}

impl RequestBuilder {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            inner: Request::builder().method(method).uri(uri),
        }
    }

    pub fn admin(self) -> Self {
        self.header("x-admin-password", ADMIN_SECRET)
    }

    pub fn client(self, ip: &str) -> Self {
        self.header("x-forwarded-for", ip)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.inner = self.inner.header(name, value);
        self
    }

    pub fn build(self) -> Request<Body> {
        self.inner.body(Body::empty()).expect("valid request")
    }

    pub fn json(self, body: Value) -> Request<Body> {
        self.inner
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request")
    }

    /// Single-part form with a `file` field.
    pub fn multipart(self, content_type: &str, data: &[u8]) -> Request<Body> {
        const BOUNDARY: &str = "moments-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        self.inner
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .expect("valid request")
    }
}

/// A submission payload that passes validation.
pub fn valid_submission() -> Value {
    serde_json::json!({
        "mediaUrl": "https://example.com/image.jpg",
        "sourceUrl": "https://example.com",
        "creatorName": "Test Creator",
        "title": "Test Submission",
    })
}
