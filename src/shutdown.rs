//! Signal handling for graceful shutdown.

use tracing::{error, info};

/// Which signal stopped the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM signal received
    Sigterm,
    /// SIGINT signal received (Ctrl+C)
    Sigint,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Sigint => write!(f, "SIGINT"),
        }
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// Returns `None` if no handler could be installed; the caller then waits
/// forever rather than shutting down immediately.
#[cfg(unix)]
pub async fn wait_for_signal() -> Option<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return None;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to install SIGINT handler");
            return None;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => Some(ShutdownSignal::Sigterm),
        _ = sigint.recv() => Some(ShutdownSignal::Sigint),
    }
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> Option<ShutdownSignal> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => Some(ShutdownSignal::Sigint),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C");
            None
        }
    }
}

/// Resolves once a shutdown signal arrives.
pub async fn shutdown_signal() {
    match wait_for_signal().await {
        Some(signal) => info!(signal = %signal, "Initiating graceful shutdown"),
        None => std::future::pending::<()>().await,
    }
}
