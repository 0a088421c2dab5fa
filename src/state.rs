//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers and the middleware pipeline. It includes:
//!
//! - **Rate limiter**: The per-client admission ledger and its eviction task
//! - **Configuration**: Runtime configuration access
//! - **Uptime**: Start timestamp for the health endpoint
//!
//! # Thread Safety
//!
//! All state components are wrapped in `Arc`, so cloning the state for each
//! request is cheap and every clone observes the same limiter.
//!
//! # Structured Concurrency
//!
//! The limiter owns its background eviction task (managed with
//! `tokio_util::task::TaskTracker` and `CancellationToken` internally).
//! Call `shutdown()` to stop it gracefully before application exit.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::limiter::RateLimiter;

/// Shared application state for Axum handlers.
///
/// # Lifecycle
///
/// Building the state starts the limiter's eviction task, so it must happen
/// inside a Tokio runtime. Call `shutdown()` before dropping:
///
/// ```rust,ignore
/// let state = AppState::new(config);
/// // ... serve requests ...
/// state.shutdown().await;  // Wait for background tasks to complete
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Per-client admission ledger, shared with the rate limit layer
    pub limiter: Arc<RateLimiter>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create new application state from configuration.
    ///
    /// # Background Tasks
    ///
    /// This starts the limiter's bucket eviction task, which sweeps client
    /// state idle for longer than `config.max_bucket_idle` every
    /// `config.eviction_interval`.
    pub fn new(config: Config) -> Self {
        let limiter = RateLimiter::new(
            config.rate_limit_policy(),
            config.eviction_interval,
            config.max_bucket_idle,
        );

        Self {
            limiter,
            started_at: Instant::now(),
            config: Arc::new(config),
        }
    }

    /// Gracefully shutdown background work.
    ///
    /// Signals the limiter's eviction task to stop and waits for it to
    /// complete. Admission checks keep working afterwards, which matters
    /// for requests still draining during shutdown.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");
        self.limiter.stop().await;
        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
