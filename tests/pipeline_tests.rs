//! In-process tests for the middleware pipeline.
//!
//! These drive the fully assembled router through `tower::ServiceExt::oneshot`
//! without opening a socket, so every assertion is about pipeline semantics:
//! which stage short-circuits, with what status, and what the stages below
//! it never get to see.
//!
//! Requests here carry no connection info, so clients that send no
//! `X-Forwarded-For` header all resolve to the shared "unknown" identity.
//! Each test builds its own router and limiter; there is no cross-test state.
//!
//! Run with: `cargo test --test pipeline_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode, header};
use tower::ServiceExt;

use tollgate::{AppState, Config, build_router};

const TEST_API_KEY: &str = "test-secret-api-key-12345";

/// Config for pipeline tests: auth on, generous eviction timers so the
/// background sweeper never interferes with a running test.
fn test_config(burst: u32) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        rate_limit_burst: burst,
        rate_limit_window: Duration::from_secs(60),
        eviction_interval: Duration::from_secs(3600),
        max_bucket_idle: Duration::from_secs(3600),
        api_key: Some(TEST_API_KEY.to_string()),
        auth_bypass_paths: vec!["/health".to_string()],
        cors_allowed_origins: vec!["*".to_string()],
        log_level: "warn".to_string(),
        metrics_port: 0,
    }
}

fn test_app(config: Config) -> (Router, AppState) {
    let state = AppState::new(config);
    (build_router(state.clone()), state)
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone()
        .oneshot(request)
        .await
        .expect("Pipeline request failed")
}

async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&bytes).expect("Response body was not JSON")
}

fn get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .body(Body::empty())
        .expect("Failed to build request")
}

fn authed_get(path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-api-key", TEST_API_KEY)
        .body(Body::empty())
        .expect("Failed to build request")
}

// ============================================================================
// Authentication Tests
// ============================================================================

#[tokio::test]
async fn test_missing_api_key_is_401() {
    let (app, state) = test_app(test_config(5));

    let response = send(&app, get("/")).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(
        response.headers().contains_key(header::WWW_AUTHENTICATE),
        "401 should tell the client how to authenticate"
    );

    let body = body_json(response).await;
    assert_eq!(body["error"], "unauthorized");
    state.shutdown().await;
}

#[tokio::test]
async fn test_wrong_api_key_is_403() {
    let (app, state) = test_app(test_config(5));

    let request = Request::builder()
        .uri("/")
        .header("x-api-key", "not-the-right-key")
        .body(Body::empty())
        .expect("Failed to build request");
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["error"], "forbidden");
    state.shutdown().await;
}

#[tokio::test]
async fn test_valid_api_key_reaches_handler() {
    let (app, state) = test_app(test_config(5));

    let response = send(&app, authed_get("/")).await;

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Hello! You hit /");
    state.shutdown().await;
}

#[tokio::test]
async fn test_health_bypasses_auth() {
    let (app, state) = test_app(test_config(5));

    let response = send(&app, get("/health")).await;

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body.get("version").is_some());
    assert!(body.get("timestamp").is_some());
    state.shutdown().await;
}

#[tokio::test]
async fn test_unmatched_path_falls_back_to_greeting() {
    let (app, state) = test_app(test_config(5));

    let response = send(&app, authed_get("/no/such/route")).await;

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["message"], "Hello! You hit /no/such/route");
    state.shutdown().await;
}

// ============================================================================
// CORS Tests
// ============================================================================

#[tokio::test]
async fn test_preflight_succeeds_without_api_key() {
    let (app, state) = test_app(test_config(5));

    // A browser preflight never carries credential headers; CORS sits above
    // auth in the pipeline precisely so this succeeds anyway.
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/")
        .header(header::ORIGIN, "https://app.example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .expect("Failed to build request");
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "Preflight response should carry CORS headers"
    );
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS),
        "Preflight response should list allowed methods"
    );
    state.shutdown().await;
}

#[tokio::test]
async fn test_cors_headers_on_simple_request() {
    let (app, state) = test_app(test_config(5));

    let request = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "https://app.example.com")
        .body(Body::empty())
        .expect("Failed to build request");
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "Cross-origin responses should carry Access-Control-Allow-Origin"
    );
    state.shutdown().await;
}

// ============================================================================
// Panic Recovery Tests
// ============================================================================

#[tokio::test]
async fn test_panicking_handler_returns_500_and_service_survives() {
    let (app, state) = test_app(test_config(5));

    let response = send(&app, authed_get("/boom")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "internal_error");

    // The panic must not poison anything shared; the next request is served.
    let response = send(&app, authed_get("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    state.shutdown().await;
}

// ============================================================================
// Rate Limiting Tests
// ============================================================================

#[tokio::test]
async fn test_burst_exhaustion_returns_429_with_retry_headers() {
    let (app, state) = test_app(test_config(3));

    for _ in 0..3 {
        let response = send(&app, authed_get("/")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = send(&app, authed_get("/")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(
        response.headers().contains_key(header::RETRY_AFTER),
        "Rate limited response should include Retry-After header"
    );
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-limit")
            .and_then(|v| v.to_str().ok()),
        Some("3")
    );
    assert_eq!(
        response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok()),
        Some("0")
    );

    let body = body_json(response).await;
    assert_eq!(body["error"], "rate_limited");
    state.shutdown().await;
}

#[tokio::test]
async fn test_rate_limit_outranks_auth() {
    let (app, state) = test_app(test_config(1));

    // First request has no key: it clears the rate limiter and is rejected
    // by auth further down.
    let response = send(&app, get("/")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Second request would also fail auth, but the bucket is already empty
    // and the rate limiter sits above auth, so the 429 wins.
    let response = send(&app, get("/")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    state.shutdown().await;
}

#[tokio::test]
async fn test_forwarded_for_pins_the_client_identity() {
    let (app, state) = test_app(test_config(2));

    let from = |xff: &str| {
        Request::builder()
            .uri("/")
            .header("x-api-key", TEST_API_KEY)
            .header("x-forwarded-for", xff)
            .body(Body::empty())
            .expect("Failed to build request")
    };

    // Only the first entry of the chain identifies the client, so these two
    // spellings drain the same bucket.
    let response = send(&app, from("203.0.113.5, 10.0.0.1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&app, from("203.0.113.5")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = send(&app, from("203.0.113.5, 172.16.0.3")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client is unaffected.
    let response = send(&app, from("198.51.100.7")).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(state.limiter.tracked_clients(), 2);
    state.shutdown().await;
}

#[tokio::test]
async fn test_health_is_not_exempt_from_rate_limiting() {
    let (app, state) = test_app(test_config(1));

    // Auth bypass does not mean rate limit bypass; a probe loop still
    // spends tokens.
    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    state.shutdown().await;
}
