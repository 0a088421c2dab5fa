//! Demo endpoints for exercising the middleware pipeline.
//!
//! # Endpoints
//!
//! - `GET /` (and any unmatched path) - Greeting that echoes the path
//! - `GET /boom` - Deliberate panic, caught by the recovery layer
//!
//! These handlers carry no business logic. They exist so the pipeline
//! has something to wrap and so each middleware stage can be observed
//! from curl: the greeting shows a request that made it all the way
//! through, and `/boom` shows a panic coming back as a 500.

use axum::Json;
use axum::http::Uri;
use tracing::instrument;

use crate::models::GreetingResponse;

/// Greeting handler, also mounted as the router fallback.
///
/// Echoing the requested path makes it obvious which URL actually
/// reached the handler once the pipeline is done with the request.
#[instrument]
pub async fn greet(uri: Uri) -> Json<GreetingResponse> {
    Json(GreetingResponse {
        message: format!("Hello! You hit {}", uri.path()),
    })
}

/// Panics on purpose so the recovery layer has something to catch.
///
/// Hitting this in a running deployment verifies that a handler panic
/// comes back as a 500 response instead of a dropped connection.
#[instrument]
pub async fn boom() -> &'static str {
    panic!("the /boom endpoint was asked to panic")
}
