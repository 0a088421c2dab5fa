//! Health endpoint.
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness check with limiter statistics
//!
//! The health endpoint is listed in the default auth bypass set so that
//! load balancers and orchestrators can probe it without an API key. It
//! still passes through the rate limiter, which keeps an unauthenticated
//! probe loop from becoming free traffic.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// Always returns 200 OK. The body carries enough detail to spot a
/// misbehaving limiter from the outside: `tracked_clients` growing
/// without bound means the eviction task is not running.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "ok",
///   "tracked_clients": 17,
///   "uptime_seconds": 3600,
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        tracked_clients: state.limiter.tracked_clients(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}
