//! Error types for the notify crate.

use thiserror::Error;

/// Result type for notify operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building escalation transports.
///
/// Delivery failures are reported per message as
/// [`vigil_reconciler::DispatchError`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// HTTP client could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
