//! HTTP middleware stages of the admission pipeline.
//!
//! This module provides the custom stages; CORS comes from `tower-http` and
//! is wired in alongside these in `routes.rs`.
//!
//! - **Recovery**: Catches handler panics and converts them to 500s
//! - **Request Logging**: Start/completion lines with status and elapsed time
//! - **Rate Limiting**: Per-client token buckets keyed by resolved identity
//! - **API Key Authentication**: Constant-time comparison, allow-listed bypass paths
//!
//! # Architecture
//!
//! ```text
//! Request → Recovery → Logging → Rate Limit → CORS → Auth → Handler
//!              ↓                      ↓          ↓      ↓
//!          500 on panic       429 Too Many   200 on  401 missing key
//!                                            OPTIONS 403 invalid key
//! ```
//!
//! Order is load-bearing: recovery must be outermost to see every panic,
//! logging next so short-circuited requests still get a completion line,
//! rate limiting before the cheap CORS/auth stages so a hammering client
//! is priced before anything else runs, and CORS before auth so browser
//! preflights (which never carry credential headers) succeed.
//!
//! # Security Considerations
//!
//! - API key comparison uses constant-time equality to prevent timing attacks
//! - Rate limiting prevents abuse from any single client identity
//! - Client identity resolution trusts `X-Forwarded-For`; see the
//!   [`client_ip`] module docs for the deployment requirements that implies

pub mod auth;
pub mod client_ip;
pub mod rate_limit;
pub mod recovery;
pub mod request_log;

pub use auth::{API_KEY_HEADER, ApiKeyAuth};
pub use client_ip::{FORWARDED_FOR_HEADER, UNKNOWN_CLIENT, client_identity};
pub use rate_limit::RateLimitLayer;
pub use recovery::RecoveryLayer;
pub use request_log::RequestLogLayer;
