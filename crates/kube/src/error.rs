//! Error types for the Kubernetes integration.

use thiserror::Error;

/// Result type alias for Kubernetes operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Kubernetes integration errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to convert JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pod template: {reason}")]
    InvalidTemplate { reason: String },
}

impl Error {
    /// Create an invalid template error.
    pub fn invalid_template(reason: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            reason: reason.into(),
        }
    }
}
