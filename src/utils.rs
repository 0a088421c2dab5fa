use tokio::signal;
use tracing::{error, warn};

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// Used with [`axum::serve`]'s `with_graceful_shutdown` so in-flight
/// requests drain before the process exits.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without working
/// signal handlers the process could never shut down cleanly, so this
/// is treated as a fatal startup defect.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            panic!("signal handling unavailable: Ctrl+C handler failed to install");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                panic!("signal handling unavailable: SIGTERM handler failed to install");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    warn!("Received {received}, initiating graceful shutdown...");
}
