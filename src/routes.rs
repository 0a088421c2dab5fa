//! Route table and the middleware pipeline wrapped around it.
//!
//! # Pipeline (order seen by a request)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │  Panic Recovery  │ ← 500 if a handler panics
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Request Logging  │ ← start/completion log lines
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client's bucket is empty
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← cross-origin headers, answers preflights
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │  Authentication  │ ← 401 missing key, 403 wrong key
//! └────────┬─────────┘
//!          │
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health` - Health & monitoring (auth bypassed by default)
//! - `/boom` - Deliberate panic for exercising the recovery stage
//! - `/` and every unmatched path - Greeting demo

use axum::Router;
use axum::http::{HeaderName, Method, header};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::handlers;
use crate::middleware::{
    API_KEY_HEADER, ApiKeyAuth, RateLimitLayer, RecoveryLayer, RequestLogLayer,
};
use crate::state::AppState;

/// Assemble the router and wrap it in the full middleware pipeline.
///
/// Recovery, logging, and rate limiting are always present. CORS follows
/// `cors_allowed_origins`, and the authentication stage is only layered in
/// when `api_key` is set. `state` provides the config and the shared
/// limiter; the returned router is ready for `axum::serve`.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    let cors = build_cors_layer(&config.cors_allowed_origins);

    // =========================================================================
    // Build Router with Routes
    // =========================================================================
    let mut router = Router::new()
        // Health endpoint (auth bypassed by default)
        .route("/health", get(handlers::health_check))
        // Demo endpoints
        .route("/", get(handlers::greet))
        .route("/boom", get(handlers::boom))
        // Everything else gets the greeting too
        .fallback(handlers::greet);

    // =========================================================================
    // Apply Middleware Stack (order matters - the last layer added is the
    // outermost, so stages are listed innermost first)
    // =========================================================================

    // 1. Authentication (if enabled) - runs right before the handler
    let auth_layer = ApiKeyAuth::new(config.api_key.clone(), config.auth_bypass_paths.clone());
    if auth_layer.is_enabled() {
        info!(
            bypass_paths = ?config.auth_bypass_paths,
            "API key authentication enabled"
        );
        router = router.layer(auth_layer);
    } else {
        info!("Running without API key authentication (API_KEY unset)");
    }

    // 2. CORS - before auth so browser preflights never need credentials
    router = router.layer(cors);

    // 3. Rate Limiting - prices a hammering client before CORS/auth run
    info!(
        burst = config.rate_limit_burst,
        window_secs = config.rate_limit_window.as_secs(),
        "Rate limiting enabled"
    );
    router = router.layer(RateLimitLayer::new(state.limiter.clone()));

    // 4. Request Logging - sees every request, including short-circuited ones
    router = router.layer(RequestLogLayer::new());

    // 5. Panic Recovery - outermost so nothing escapes it
    router = router.layer(RecoveryLayer::new());

    // Add state
    router.with_state(state)
}

/// Build the CORS layer for `allowed_origins`; `["*"]` admits any origin.
///
/// # Security Note
///
/// A `*` origin list suits development only. Production should enumerate
/// its origins so credentials never leak to arbitrary sites.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)]);

    // A single "*" entry anywhere in the list wins
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        cors.allow_origin(Any)
    } else {
        // Unparseable entries are skipped rather than fatal
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        cors.allow_origin(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_cors_layer_accepts_wildcard_origin() {
        let origins = vec!["*".to_string()];
        let _layer = build_cors_layer(&origins);
    }

    #[test]
    fn test_cors_layer_accepts_explicit_origins() {
        let origins = vec![
            "https://dashboard.tollgate.dev".to_string(),
            "https://api.tollgate.dev".to_string(),
        ];
        let _layer = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn test_build_router_with_default_config() {
        let state = AppState::new(Config::default());
        let _router = build_router(state.clone());
        state.shutdown().await;
    }
}
