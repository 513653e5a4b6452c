//! Configuration errors for check specs.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.
//! A check whose spec fails validation is never scheduled; the error is
//! surfaced through its status instead.

use thiserror::Error;

/// Result type alias for spec validation and parsing.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// A check spec that cannot be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("'{field}' must be greater than zero")]
    NonPositive { field: &'static str },

    #[error("at least one escalation is required")]
    NoEscalations,

    #[error("escalation #{index} has an empty type")]
    EmptyEscalationType { index: usize },

    #[error("invalid duration '{input}': {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ConfigError {
    /// Create a missing field error.
    #[must_use]
    pub const fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Create a non-positive value error.
    #[must_use]
    pub const fn non_positive(field: &'static str) -> Self {
        Self::NonPositive { field }
    }

    /// Create an invalid duration error.
    pub fn invalid_duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::missing_field("checkInterval");
        assert!(err.to_string().contains("checkInterval"));
    }

    #[test]
    fn test_invalid_duration_display() {
        let err = ConfigError::invalid_duration("5x", "unknown unit 'x'");
        assert!(err.to_string().contains("5x"));
        assert!(err.to_string().contains("unknown unit"));
    }
}
