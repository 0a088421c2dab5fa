//! API key authentication, the innermost pipeline stage.
//!
//! # Security Features
//!
//! - **Constant-time key comparison**: a wrong key costs the same wall time
//!   as a nearly-right one, so response timing leaks nothing about the secret
//! - **Selective protection**: allow-listed paths skip the check entirely
//! - **Distinct failure modes**: `401` when the key header is absent, `403`
//!   when a key is present but wrong, so clients and dashboards can tell
//!   "forgot the header" apart from "wrong credential"
//!
//! # Usage
//!
//! Authentication turns on when `API_KEY` is set in the environment:
//!
//! ```bash
//! API_KEY=your-secret-key cargo run
//! ```
//!
//! Clients must then provide the key via the `X-API-Key` header:
//!
//! ```bash
//! curl -H "X-API-Key: your-secret-key" http://localhost:3000/
//! ```
//!
//! # Bypassed Endpoints
//!
//! `/health` is accessible without an API key by default so load balancer
//! and monitoring probes keep working. Bypass paths use **exact string
//! matching** against `request.uri().path()`:
//!
//! - `/health` passes, `/health/` (trailing slash) does not
//! - `/health?foo=bar` passes (the query string is not part of the path)
//! - `/HEALTH` does not (matching is case-sensitive)
//!
//! This strictness is intentional: it prevents accidental bypasses via path
//! manipulation. Configure bypass paths exactly as your probes request them.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use subtle::ConstantTimeEq;
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::client_ip::client_identity;

/// Request header clients put their API key in.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Paths exempt from the key check unless overridden.
const DEFAULT_BYPASS_PATHS: [&str; 1] = ["/health"];

/// Layer that gates requests on a shared API key.
///
/// With no expected key the layer waves every request through, which is
/// how deployments without `API_KEY` run. The bypass list is configurable
/// via the `AUTH_BYPASS_PATHS` environment variable.
#[derive(Clone)]
pub struct ApiKeyAuth {
    /// Key clients must present; `None` disables the check
    expected_key: Option<Arc<String>>,
    /// Exact-match paths exempt from the check
    bypass_paths: Arc<Vec<String>>,
}

impl ApiKeyAuth {
    /// Build a layer expecting `api_key`, with `bypass_paths` exempt.
    ///
    /// Passing `None` for the key disables authentication entirely.
    pub fn new(api_key: Option<String>, bypass_paths: Vec<String>) -> Self {
        Self {
            expected_key: api_key.map(Arc::new),
            bypass_paths: Arc::new(bypass_paths),
        }
    }

    /// Create with the default bypass list (`/health`).
    pub fn with_defaults(api_key: Option<String>) -> Self {
        Self::new(
            api_key,
            DEFAULT_BYPASS_PATHS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        )
    }

    /// Whether a key is configured and the check is active.
    pub fn is_enabled(&self) -> bool {
        self.expected_key.is_some()
    }
}

impl<S> Layer<S> for ApiKeyAuth {
    type Service = ApiKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyAuthService {
            inner,
            expected_key: self.expected_key.clone(),
            bypass_paths: self.bypass_paths.clone(),
        }
    }
}

/// The wrapped service that performs the key check per request.
#[derive(Clone)]
pub struct ApiKeyAuthService<S> {
    inner: S,
    expected_key: Option<Arc<String>>,
    bypass_paths: Arc<Vec<String>>,
}

impl<S> Service<Request<Body>> for ApiKeyAuthService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let expected_key = self.expected_key.clone();
        let bypass_paths = self.bypass_paths.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // No configured key means the stage is inert.
            let Some(expected) = expected_key else {
                return inner.call(req).await;
            };

            // Allow-listed paths skip the check.
            let path = req.uri().path();
            if bypass_paths.iter().any(|p| p == path) {
                debug!(path, "Bypassing auth for allow-listed path");
                return inner.call(req).await;
            }

            // Copy the provided key out of the headers so the request can
            // be moved into the inner call on success.
            let provided = req
                .headers()
                .get(API_KEY_HEADER)
                .map(|value| value.to_str().map(str::to_owned));

            match provided {
                Some(Ok(key)) if constant_time_eq(&key, &expected) => {
                    debug!("API key accepted");
                    inner.call(req).await
                }
                // Present but wrong, or not valid UTF-8: the credential
                // itself is bad.
                Some(_) => {
                    let client = client_identity(&req);
                    warn!(
                        path = %req.uri().path(),
                        client = %client,
                        "API key does not match"
                    );
                    crate::metrics::record_request_rejected("invalid_key");
                    Ok(forbidden_response())
                }
                None => {
                    let client = client_identity(&req);
                    warn!(
                        path = %req.uri().path(),
                        client = %client,
                        "No API key on request"
                    );
                    crate::metrics::record_request_rejected("missing_key");
                    Ok(unauthorized_response())
                }
            }
        })
    }
}

/// Compare two strings without short-circuiting on the first mismatch.
///
/// Branching on a prefix match would let an attacker recover the key
/// byte by byte from response timings.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    a_bytes.ct_eq(b_bytes).into()
}

/// Build an unauthorized (401) response for a missing credential.
fn unauthorized_response() -> Response<Body> {
    (
        StatusCode::UNAUTHORIZED,
        [
            ("WWW-Authenticate", "API-Key"),
            ("Content-Type", "application/json"),
        ],
        r#"{"error":"unauthorized","message":"Missing API key"}"#,
    )
        .into_response()
}

/// Build a forbidden (403) response for a credential that failed validation.
fn forbidden_response() -> Response<Body> {
    (
        StatusCode::FORBIDDEN,
        [("Content-Type", "application/json")],
        r#"{"error":"forbidden","message":"Invalid API key"}"#,
    )
        .into_response()
}
