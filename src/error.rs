use thiserror::Error;

/// Errors that can stop the service from starting.
///
/// Everything that happens after startup is handled inside the middleware
/// pipeline: rejections become HTTP responses and handler panics are caught
/// by the recovery layer, so no request-time path produces an `AppError`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
