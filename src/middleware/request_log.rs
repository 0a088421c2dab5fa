//! Request logging middleware.
//!
//! Sits directly inside the recovery layer, so every request that enters
//! the pipeline gets a completion line with its status and elapsed time,
//! including requests that a later stage short-circuits (rate limit, CORS
//! preflight, auth). Only a panic bypasses the completion line, and the
//! recovery layer logs that case itself.
//!
//! Emits `Request started` at debug and `Request completed` at info, and
//! feeds the request counter and duration histogram. Log lines carry the
//! raw path; metrics are labeled by the matched route template instead,
//! with fallback-served requests collapsed under one label value, so the
//! set of Prometheus series stays bounded by the route table no matter
//! what URLs clients send.

use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::{debug, info};

/// Route label for requests the router's fallback served. The fallback
/// admits arbitrary URLs, and every distinct label value is a Prometheus
/// series the registry never drops, so they all share this one.
const FALLBACK_ROUTE: &str = "fallback";

/// Request logging layer for the Tower middleware stack.
#[derive(Clone, Default)]
pub struct RequestLogLayer;

impl RequestLogLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService { inner }
    }
}

/// Request logging service wrapper.
#[derive(Clone)]
pub struct RequestLogService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestLogService<S>
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
        // Method, path, and matched route are captured before the request
        // is moved into the inner service. Routing has already run by the
        // time router-level middleware is called, so the matched route sits
        // in the request extensions; fallback requests carry none.
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let matched = req.extensions().get::<MatchedPath>().cloned();
        let start = Instant::now();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            debug!(method = %method, path = %path, "Request started");

            let response = inner.call(req).await?;
            let elapsed = start.elapsed();
            let status = response.status();

            info!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Request completed"
            );
            let route = matched.as_ref().map_or(FALLBACK_ROUTE, |m| m.as_str());
            crate::metrics::record_request(method.as_str(), route);
            crate::metrics::record_request_duration(
                route,
                method.as_str(),
                status.as_str(),
                elapsed.as_secs_f64(),
            );

            Ok(response)
        })
    }
}
