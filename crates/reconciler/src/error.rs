//! Error types for the reconciler crate.
//!
//! Collaborator errors ([`StoreError`], [`BackendError`], [`DispatchError`],
//! [`WatchError`]) are produced by the trait implementations and handled
//! inside a check's task. Only [`Error`] leaves the controller.

use thiserror::Error;

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The watch stream failed too many times in a row.
    #[error("watch failed {attempts} times in a row: {reason}")]
    WatchFailed { attempts: u32, reason: String },

    /// The watch stream ended without a shutdown request.
    #[error("watch stream ended unexpectedly")]
    WatchEnded,
}

impl Error {
    /// Create a watch failed error.
    pub fn watch_failed(attempts: u32, reason: impl Into<String>) -> Self {
        Self::WatchFailed {
            attempts,
            reason: reason.into(),
        }
    }
}

/// Persisting a check's status failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status write for '{check}' failed: {reason}")]
pub struct StoreError {
    pub check: String,
    pub reason: String,
}

impl StoreError {
    /// Create a store error.
    pub fn new(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            check: check.into(),
            reason: reason.into(),
        }
    }
}

/// The execution backend failed in a way it could not classify.
///
/// Launch failures and timeouts are reported through
/// [`ExecutionResult`](crate::backend::ExecutionResult) instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("execution backend error: {reason}")]
pub struct BackendError {
    pub reason: String,
}

impl BackendError {
    /// Create a backend error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Delivering one escalation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no handler registered for escalation type '{kind}'")]
    UnknownType { kind: String },

    #[error("escalation '{kind}' is missing argument '{arg}'")]
    MissingArg { kind: String, arg: String },

    #[error("escalation '{kind}' delivery failed: {reason}")]
    DeliveryFailed { kind: String, reason: String },
}

impl DispatchError {
    /// Create an unknown type error.
    pub fn unknown_type(kind: impl Into<String>) -> Self {
        Self::UnknownType { kind: kind.into() }
    }

    /// Create a missing argument error.
    pub fn missing_arg(kind: impl Into<String>, arg: impl Into<String>) -> Self {
        Self::MissingArg {
            kind: kind.into(),
            arg: arg.into(),
        }
    }

    /// Create a delivery failed error.
    pub fn delivery_failed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeliveryFailed {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

/// One failure of the resource watch stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("watch error: {reason}")]
pub struct WatchError {
    pub reason: String,
}

impl WatchError {
    /// Create a watch error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
