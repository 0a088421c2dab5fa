//! Panic recovery middleware.
//!
//! Outermost stage of the pipeline: any panic raised while handling a
//! request, whether in a handler or in a deeper middleware stage, is caught
//! here and converted into a generic `500` so one failing request cannot
//! take the worker or the process down. The panic cause is logged
//! server-side and never echoed to the client.
//!
//! Both panic sites are covered: a synchronous panic out of the inner
//! service's `call`, and a panic raised while the returned future is polled
//! (the common case for async handlers).
//!
//! Unwinding must be enabled for this layer to see panics at all, so the
//! release profile must not set `panic = "abort"`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use futures_util::FutureExt;
use tower::{Layer, Service};
use tracing::error;

/// Panic recovery layer for the Tower middleware stack.
#[derive(Clone, Default)]
pub struct RecoveryLayer;

impl RecoveryLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService { inner }
    }
}

/// Panic recovery service wrapper.
#[derive(Clone)]
pub struct RecoveryService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RecoveryService<S>
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
        // Captured up front: on a panic the request is gone.
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let future = match std::panic::catch_unwind(AssertUnwindSafe(|| inner.call(req))) {
                Ok(future) => future,
                Err(panic) => return Ok(recovered(panic, method.as_str(), &path)),
            };

            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Ok(recovered(panic, method.as_str(), &path)),
            }
        })
    }
}

/// Log the caught panic and build the generic 500 sent in its place.
fn recovered(panic: Box<dyn Any + Send>, method: &str, path: &str) -> Response<Body> {
    let cause = panic_cause(panic.as_ref());
    error!(
        cause = %cause,
        method = %method,
        path = %path,
        "Recovered panic while handling request"
    );
    crate::metrics::record_panic_recovered();

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [("Content-Type", "application/json")],
        r#"{"error":"internal_error","message":"An internal error occurred. Please try again later."}"#,
    )
        .into_response()
}

/// Panic payloads are almost always `&str` or `String`; anything else gets
/// a placeholder rather than a `Debug` dump of an opaque box.
fn panic_cause(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
