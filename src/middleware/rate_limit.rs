//! Rate limiting middleware backed by per-client token buckets.
//!
//! # Algorithm
//!
//! Each client identity owns a token bucket (see [`crate::limiter`]) that
//! starts full, spends one token per request and refills lazily at a fixed
//! rate up to its burst capacity. This admits short bursts while holding
//! sustained traffic to the configured rate, and a client that stays idle
//! earns its burst back instead of being punished for the quiet period.
//!
//! # Client identity
//!
//! Requests are keyed by [`client_identity`]: the first `X-Forwarded-For`
//! entry, else the connection peer IP, else a shared `"unknown"` key. See
//! the [`super::client_ip`] module docs for the spoofing caveats that come
//! with trusting a client-supplied header.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Seconds until a whole token is back at the sustained rate
//! - `X-RateLimit-Limit`: Configured burst capacity
//! - `X-RateLimit-Remaining`: Always `0` on a rejection

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use tower::{Layer, Service};
use tracing::warn;

use super::client_ip::client_identity;
use crate::limiter::RateLimiter;

/// Rate limiting layer for the Tower middleware stack.
///
/// Holds a shared handle to the limiter owned by application state, so the
/// admission ledger survives router clones and is visible to the health
/// endpoint and the eviction task.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    /// Burst capacity, echoed in the `X-RateLimit-Limit` header.
    limit: u32,
    /// `Retry-After` hint in seconds, derived from the refill rate.
    retry_after: u64,
}

impl RateLimitLayer {
    /// Builds the layer around an existing limiter. Header values are
    /// derived from the limiter's policy once, up front.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        let policy = limiter.policy();
        Self {
            limiter,
            limit: policy.capacity as u32,
            retry_after: policy.sustained_interval().as_secs().max(1),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            limit: self.limit,
            retry_after: self.retry_after,
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    limit: u32,
    retry_after: u64,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        let limiter = self.limiter.clone();
        let limit = self.limit;
        let retry_after = self.retry_after;
        let mut inner = self.inner.clone();

        // Resolve the identity before moving req; owned so it can outlive
        // the request reference inside the async block.
        let identity = client_identity(&req).into_owned();

        Box::pin(async move {
            if limiter.allow(&identity) {
                inner.call(req).await
            } else {
                let path = req.uri().path();
                warn!(
                    client = %identity,
                    path = %path,
                    retry_after_secs = retry_after,
                    "Rate limit exceeded for client"
                );
                crate::metrics::record_request_rejected("rate_limited");

                Ok(rate_limited_response(retry_after, limit))
            }
        })
    }
}

/// Build a rate limited (429) response with retry headers.
fn rate_limited_response(retry_after: u64, limit: u32) -> Response<Body> {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [
            ("Retry-After", retry_after.to_string()),
            ("X-RateLimit-Limit", limit.to_string()),
            ("X-RateLimit-Remaining", "0".to_string()),
            ("Content-Type", "application/json".to_string()),
        ],
        r#"{"error":"rate_limited","message":"Rate limit exceeded. Please retry later."}"#
            .to_string(),
    )
        .into_response()
}
