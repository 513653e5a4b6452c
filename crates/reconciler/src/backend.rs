//! Execution backend interface.
//!
//! A backend runs one check payload to completion inside a disposable
//! execution unit and removes the unit before returning, whatever the
//! outcome. Implementations must also remove the unit when the returned
//! future is dropped before completion.

use std::time::Duration;

use async_trait::async_trait;
use vigil_core::{CheckId, ExecutionPayload, ExitResult};

use crate::error::BackendError;

/// One run to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    /// The check being run.
    pub check: CheckId,
    /// What to execute.
    pub payload: ExecutionPayload,
    /// Upper bound on run time.
    pub timeout: Duration,
}

/// What a finished run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Process exit code, when the payload got far enough to have one.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub logs: String,
    /// Whether the execution unit started at all.
    pub started: bool,
    /// Whether the run was terminated for exceeding its timeout.
    pub timed_out: bool,
    /// Diagnostic for launch errors and timeouts.
    pub detail: String,
}

impl ExecutionResult {
    /// A run that exited with `code`.
    pub fn exited(code: i32, logs: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            logs: logs.into(),
            started: true,
            ..Self::default()
        }
    }

    /// A unit that never started.
    pub fn not_started(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..Self::default()
        }
    }

    /// A run that was killed at its timeout.
    pub fn timed_out(logs: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            logs: logs.into(),
            started: true,
            timed_out: true,
            detail: detail.into(),
            ..Self::default()
        }
    }

    /// Classify the run for the state machine.
    ///
    /// A started run with no exit code and no timeout flag counts as a
    /// failure.
    #[must_use]
    pub fn outcome(&self) -> ExitResult {
        if !self.started {
            ExitResult::LaunchError
        } else if self.timed_out {
            ExitResult::Timeout
        } else {
            self.exit_code
                .map_or(ExitResult::Failure, ExitResult::from_exit_code)
        }
    }
}

/// Runs check payloads.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run `request` to completion and clean up its execution unit.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] only for faults that are neither a launch
    /// failure nor a timeout; the reconciler records those as launch errors.
    async fn run(&self, request: ExecutionRequest) -> Result<ExecutionResult, BackendError>;
}
