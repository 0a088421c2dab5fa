//! Runtime configuration, sourced entirely from the environment.
//!
//! Every setting has a development-friendly default, so a bare `cargo run`
//! works. Production deployments override via environment variables or a
//! `.env` file picked up at startup.
//!
//! # Security Configuration
//!
//! - `API_KEY`: When set, enables API key authentication for all endpoints except
//!   the allow-listed bypass paths
//! - `AUTH_BYPASS_PATHS`: Comma-separated paths that skip authentication (default: `/health`)
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated allowed origins, or `*` (the default) to
//!   accept any origin while developing
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_BURST`: Token bucket capacity per client (default: 5)
//! - `RATE_LIMIT_WINDOW_SECS`: Window over which a full burst refills (default: 60)
//! - `EVICTION_INTERVAL_SECS`: How often stale buckets are swept (default: 300)
//! - `MAX_BUCKET_IDLE_SECS`: Idle time before a bucket is swept (default: 600)

use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::limiter::{DEFAULT_BURST, DEFAULT_WINDOW, RateLimitPolicy};

/// Everything the server needs to start, resolved once at boot.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// let addr = config.server_addr();
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Interface to bind (default: "0.0.0.0")
    pub host: String,

    /// TCP port to listen on (default: 3000)
    pub port: u16,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Token bucket capacity per client identity (default: 5).
    /// A client's first `rate_limit_burst` requests are admitted instantly.
    pub rate_limit_burst: u32,

    /// Window over which a fully drained bucket refills (default: 60s).
    /// The sustained rate is `rate_limit_burst / rate_limit_window`.
    pub rate_limit_window: Duration,

    /// How often the background task sweeps stale buckets (default: 300s)
    pub eviction_interval: Duration,

    /// Idle time after which a client's bucket is swept (default: 600s).
    /// An evicted client starts over with a full bucket on its next request.
    pub max_bucket_idle: Duration,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// API key for authentication (optional - when set, all endpoints except
    /// the bypass paths require it via the `X-API-Key` header)
    pub api_key: Option<String>,

    /// Paths probes may hit without a key (default: ["/health"]).
    /// Keep this list to endpoints that reveal nothing sensitive.
    pub auth_bypass_paths: Vec<String>,

    /// Origins CORS will admit. A single "*" entry means any origin,
    /// which suits development but not production.
    /// Example: `<https://app.example.com>,<https://admin.example.com>`
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log filter mirrored from `RUST_LOG` (e.g. "info", "debug")
    pub log_level: String,

    /// Prometheus exporter port; 0 turns the exporter off (default: 9090)
    pub metrics_port: u16,
}

impl Config {
    /// Read every setting from the environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a value fails to parse
    /// (e.g., non-numeric PORT) or fails validation (e.g., zero window).
    pub fn from_env() -> AppResult<Self> {
        // A local .env is picked up when present; absence is fine.
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,

            // Rate limiting
            rate_limit_burst: Self::parse_env("RATE_LIMIT_BURST", DEFAULT_BURST)?,
            rate_limit_window: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_WINDOW.as_secs(),
            )?),
            eviction_interval: Duration::from_secs(Self::parse_env(
                "EVICTION_INTERVAL_SECS",
                300, // 5 minutes
            )?),
            max_bucket_idle: Duration::from_secs(Self::parse_env(
                "MAX_BUCKET_IDLE_SECS",
                600, // 10 minutes
            )?),

            // Security
            api_key: env::var("API_KEY").ok().filter(|k| !k.is_empty()),
            auth_bypass_paths: Self::parse_auth_bypass_paths(),
            cors_allowed_origins: Self::parse_cors_origins(),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Reject values the limiter or server cannot run with.
    fn validate(&self) -> AppResult<()> {
        if self.rate_limit_burst == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_BURST must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit_window.is_zero() {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_WINDOW_SECS must be greater than 0".to_string(),
            ));
        }

        if self.eviction_interval.is_zero() {
            return Err(AppError::ConfigError(
                "EVICTION_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_bucket_idle.is_zero() {
            return Err(AppError::ConfigError(
                "MAX_BUCKET_IDLE_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Address string the listener binds, `host:port`.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Refill policy for the rate limiter, derived from burst and window.
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::per_window(self.rate_limit_burst, self.rate_limit_window)
    }

    /// True when an API key is configured.
    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    /// True when the Prometheus exporter should run.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Bind address for the Prometheus exporter, `None` when disabled.
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Read `name` from the environment, substituting `default` when unset.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Split `CORS_ALLOWED_ORIGINS` into a trimmed origin list.
    fn parse_cors_origins() -> Vec<String> {
        env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Split `AUTH_BYPASS_PATHS` into the keyless allow-list.
    ///
    /// Defaults to "/health" so load balancer probes work without a key.
    /// Entries that don't start with '/' are dropped rather than matched.
    fn parse_auth_bypass_paths() -> Vec<String> {
        env::var("AUTH_BYPASS_PATHS")
            .unwrap_or_else(|_| "/health".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s.starts_with('/'))
            .collect()
    }
}

/// Development defaults, used directly by tests.
///
/// Real deployments go through `Config::from_env()` so the environment wins.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            // Rate limiting
            rate_limit_burst: DEFAULT_BURST,
            rate_limit_window: DEFAULT_WINDOW,
            eviction_interval: Duration::from_secs(300),
            max_bucket_idle: Duration::from_secs(600),
            // Security
            api_key: None,
            auth_bypass_paths: vec!["/health".to_string()],
            cors_allowed_origins: vec!["*".to_string()],
            // Observability
            log_level: "info".to_string(),
            metrics_port: 9090,
        }
    }
}
