use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Number of client identities currently holding a rate-limit bucket
    pub tracked_clients: usize,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Greeting returned by the demo endpoint for any path it serves.
#[derive(Debug, Serialize)]
pub struct GreetingResponse {
    /// Greeting that echoes the requested path
    pub message: String,
}
