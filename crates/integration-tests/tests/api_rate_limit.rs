use axum::http::{Method, StatusCode};
use serde_json::json;

use integration_tests::{valid_submission, RequestBuilder, TestApp};

#[tokio::test]
async fn fourth_submission_in_an_hour_is_refused() {
    let app = TestApp::spawn().await;
    for _ in 0..3 {
        let res = app.submit("203.0.113.5", valid_submission()).await;
        assert_eq!(res.status, StatusCode::OK);
    }

    let res = app.submit("203.0.113.5", valid_submission()).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers["x-ratelimit-remaining-hour"], "0");
    assert_eq!(res.headers["x-ratelimit-remaining-day"], "7");
    let retry: u64 = res.headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry > 0 && retry <= 3600);
    assert_eq!(res.body["remaining"]["hour"], 0);
    assert!(res.body["error"].as_str().unwrap().contains("hour"));

    // refused attempts are not stored
    let queue = app.admin_get("/api/submissions").await;
    assert_eq!(queue.body["pendingCount"], 3);
    assert!(app
        .metrics
        .render()
        .unwrap()
        .contains("moments_rate_limit_denials_total{namespace=\"submission\"} 1"));
}

#[tokio::test]
async fn quotas_are_per_client() {
    let app = TestApp::spawn().await;
    for _ in 0..3 {
        app.submit("203.0.113.5", valid_submission()).await;
    }
    let other = app.submit("198.51.100.20", valid_submission()).await;
    assert_eq!(other.status, StatusCode::OK);
}

#[tokio::test]
async fn forged_forwarding_headers_do_not_reset_the_quota() {
    let app = TestApp::without_proxy().await;
    for ip in ["203.0.113.21", "203.0.113.22", "203.0.113.23"] {
        assert_eq!(app.submit(ip, valid_submission()).await.status, StatusCode::OK);
    }

    let res = app.submit("203.0.113.24", valid_submission()).await;
    assert_eq!(res.status, StatusCode::TOO_MANY_REQUESTS);

    let queue = app.admin_get("/api/submissions").await;
    assert_eq!(queue.body["submissions"][0]["submitterIp"], "unknown");
}

#[tokio::test]
async fn invalid_and_trapped_attempts_still_count() {
    let app = TestApp::spawn().await;
    let mut trap = valid_submission();
    trap["honeypot"] = json!("filled");
    let mut invalid = valid_submission();
    invalid["sourceUrl"] = json!("nope");

    assert_eq!(app.submit("203.0.113.8", trap).await.status, StatusCode::OK);
    assert_eq!(app.submit("203.0.113.8", invalid).await.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.submit("203.0.113.8", valid_submission()).await.status, StatusCode::OK);
    assert_eq!(
        app.submit("203.0.113.8", valid_submission()).await.status,
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn status_reports_without_consuming() {
    let app = TestApp::spawn().await;
    let status = |ip: &'static str| {
        app.send(
            RequestBuilder::new(Method::GET, "/api/rate-limit/submission")
                .client(ip)
                .build(),
        )
    };

    let fresh = status("203.0.113.9").await;
    assert_eq!(fresh.status, StatusCode::OK);
    assert_eq!(fresh.body["allowed"], true);
    assert_eq!(fresh.body["remainingHour"], 3);
    assert_eq!(fresh.body["remainingDay"], 10);

    // peeking twice changes nothing
    let again = status("203.0.113.9").await;
    assert_eq!(again.body["remainingHour"], 3);

    app.submit("203.0.113.9", valid_submission()).await;
    let after = status("203.0.113.9").await;
    assert_eq!(after.body["remainingHour"], 2);
    assert_eq!(after.body["remainingDay"], 9);

    let unknown = app.get("/api/rate-limit/comments").await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn curator_can_lift_a_block() {
    let app = TestApp::spawn().await;
    for _ in 0..4 {
        app.submit("203.0.113.10", valid_submission()).await;
    }

    let anon = app
        .send(RequestBuilder::new(Method::DELETE, "/api/rate-limit/submission/203.0.113.10").build())
        .await;
    assert_eq!(anon.status, StatusCode::UNAUTHORIZED);

    let cleared = app
        .send(
            RequestBuilder::new(Method::DELETE, "/api/rate-limit/submission/203.0.113.10")
                .admin()
                .build(),
        )
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(
        app.submit("203.0.113.10", valid_submission()).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn public_upload_is_metered_before_the_body_is_read() {
    let app = TestApp::spawn().await;
    let upload = || {
        app.send(
            RequestBuilder::new(Method::POST, "/api/upload/public")
                .client("203.0.113.11")
                .multipart("image/gif", b"GIF89a-test-bytes"),
        )
    };

    let first = upload().await;
    assert_eq!(first.status, StatusCode::OK, "{:?}", first.body);
    assert_eq!(first.body["remaining"]["hour"], 2);
    upload().await;
    upload().await;

    let refused = upload().await;
    assert_eq!(refused.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(refused.headers.contains_key("retry-after"));

    // a malformed body still costs a unit
    let garbage = app
        .send(
            RequestBuilder::new(Method::POST, "/api/upload/public")
                .client("203.0.113.12")
                .multipart("text/plain", b"hello"),
        )
        .await;
    assert_eq!(garbage.status, StatusCode::BAD_REQUEST);
    let status = app
        .send(
            RequestBuilder::new(Method::GET, "/api/rate-limit/upload")
                .client("203.0.113.12")
                .build(),
        )
        .await;
    assert_eq!(status.body["remainingHour"], 2);
}
