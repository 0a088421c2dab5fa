//! # Tollgate
//!
//! A layered HTTP admission pipeline for Axum, featuring:
//!
//! - **Resilience**: Handler panics become 500 responses, not dropped connections
//! - **Fairness**: Per-client token-bucket rate limiting with background eviction
//! - **Security**: Constant-time API key authentication, CORS controls
//! - **Observability**: Structured request logging, Prometheus metrics, health endpoint
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Recovery → Logging → Rate Limit → CORS → Auth) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (greet, health, boom)                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RateLimiter (shared token buckets + eviction task)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tollgate::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config);
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Security Configuration
//!
//! Enable API key authentication:
//! ```bash
//! API_KEY=your-secret-key cargo run
//! ```
//!
//! Tune the rate limit (5 requests per 60 seconds per client by default):
//! ```bash
//! RATE_LIMIT_BURST=20 RATE_LIMIT_WINDOW_SECS=60 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use limiter::{RateLimitPolicy, RateLimiter};
pub use routes::build_router;
pub use state::AppState;
