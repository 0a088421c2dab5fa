//! Prometheus counters, histograms, and gauges for the admission pipeline.
//!
//! The exporter serves scrapes on its own HTTP listener (default port 9090),
//! separate from the application server, so monitoring keeps working even
//! when the pipeline is rejecting traffic.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `tollgate_requests_total` - Requests entering the pipeline (labels: method, route)
//! - `tollgate_requests_rejected_total` - Requests short-circuited by a pipeline
//!   stage (label: reason = `rate_limited` | `missing_key` | `invalid_key`)
//! - `tollgate_panics_recovered_total` - Panics caught by the recovery layer
//! - `tollgate_buckets_evicted_total` - Stale rate limit buckets swept
//!
//! ## Histograms
//! - `tollgate_request_duration_seconds` - Request duration (labels: route, method, status)
//!
//! The `route` label is the matched route template, never the raw request
//! path; requests served by the router's fallback all share one value.
//! Raw paths would let a client mint a new series per URL it invents.
//!
//! ## Gauges
//! - `tollgate_tracked_clients` - Client identities currently holding bucket state
//!
//! # Usage
//!
//! ```rust,ignore
//! use tollgate::metrics::{init_metrics, record_request_rejected};
//!
//! // Once at startup:
//! init_metrics(addr)?;
//!
//! // At event sites:
//! record_request_rejected("rate_limited");
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names, kept in one place so emitters and dashboards agree.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "tollgate_requests_total";
    pub const REQUESTS_REJECTED_TOTAL: &str = "tollgate_requests_rejected_total";
    pub const PANICS_RECOVERED_TOTAL: &str = "tollgate_panics_recovered_total";
    pub const BUCKETS_EVICTED_TOTAL: &str = "tollgate_buckets_evicted_total";
    pub const REQUEST_DURATION_SECONDS: &str = "tollgate_request_duration_seconds";
    pub const TRACKED_CLIENTS: &str = "tollgate_tracked_clients";
}

/// Install the Prometheus recorder and start its scrape listener.
///
/// Registers descriptions for every metric in [`names`] and binds the
/// exporter to `metrics_addr`. Errs with a message if the recorder is
/// already installed or the listener cannot bind.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Prometheus exporter install failed: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total number of requests entering the pipeline"
    );
    describe_counter!(
        names::REQUESTS_REJECTED_TOTAL,
        "Total number of requests short-circuited by a pipeline stage"
    );
    describe_counter!(
        names::PANICS_RECOVERED_TOTAL,
        "Total number of handler panics caught by the recovery layer"
    );
    describe_counter!(
        names::BUCKETS_EVICTED_TOTAL,
        "Total number of stale rate limit buckets swept"
    );

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Wall time spent serving a request, in seconds"
    );

    describe_gauge!(
        names::TRACKED_CLIENTS,
        "Client identities currently holding rate limit bucket state"
    );

    info!(addr = %metrics_addr, "Prometheus exporter listening");
    Ok(())
}

/// Best-effort variant of [`init_metrics`].
///
/// A failed exporter install is logged and otherwise ignored; the server
/// runs without metrics rather than refusing to start.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Metrics exporter unavailable, continuing without it");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

/// Record a request entering the pipeline.
///
/// `route` is the matched route template (or the shared fallback value),
/// never the raw path.
pub fn record_request(method: &str, route: &str) {
    counter!(names::REQUESTS_TOTAL, "method" => method.to_string(), "route" => route.to_string())
        .increment(1);
}

/// Record a request short-circuited by a pipeline stage.
///
/// Reasons: `rate_limited`, `missing_key`, `invalid_key`.
pub fn record_request_rejected(reason: &str) {
    counter!(names::REQUESTS_REJECTED_TOTAL, "reason" => reason.to_string()).increment(1);
}

/// Record a panic caught by the recovery layer.
pub fn record_panic_recovered() {
    counter!(names::PANICS_RECOVERED_TOTAL).increment(1);
}

/// Record stale buckets swept by the eviction task.
pub fn record_buckets_evicted(count: usize) {
    counter!(names::BUCKETS_EVICTED_TOTAL).increment(count as u64);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record how long a request took end to end.
///
/// Same labeling rule as [`record_request`]: `route` is a template, not a
/// raw path.
pub fn record_request_duration(route: &str, method: &str, status: &str, duration_secs: f64) {
    histogram!(names::REQUEST_DURATION_SECONDS, "route" => route.to_string(), "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

/// Update the tracked clients gauge.
pub fn set_tracked_clients(count: usize) {
    gauge!(names::TRACKED_CLIENTS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // The metrics crate no-ops when no recorder is installed, so these
    // only assert the helpers are callable; label output is checked by
    // scraping in a real deployment, not here.

    #[test]
    fn test_record_request() {
        record_request("GET", "/");
    }

    #[test]
    fn test_record_request_rejected() {
        record_request_rejected("rate_limited");
        record_request_rejected("missing_key");
        record_request_rejected("invalid_key");
    }

    #[test]
    fn test_record_panic_recovered() {
        record_panic_recovered();
    }

    #[test]
    fn test_record_request_duration() {
        record_request_duration("/", "GET", "200", 0.1);
    }

    #[test]
    fn test_set_tracked_clients() {
        set_tracked_clients(0);
        set_tracked_clients(42);
    }
}
