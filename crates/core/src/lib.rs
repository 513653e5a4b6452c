//! Pure domain model for vigil checks.
//!
//! This crate holds everything about a check that can be decided without
//! I/O:
//!
//! - **Types**: [`CheckId`], [`CheckSpec`], [`CheckStatus`] and friends
//! - **State machine**: [`state_machine::apply`] folds a run outcome into a status
//! - **Scheduler**: [`scheduler::next_due`] computes when a check runs next
//! - **Logs**: [`logs::render`] bounds captured output for `status.logs`
//! - **Durations**: [`parse_duration`] for `"90s"`, `"1h30m"` style values
//!
//! The async engine that drives these lives in `vigil-reconciler`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod duration;
pub mod error;
pub mod logs;
pub mod scheduler;
pub mod state_machine;
pub mod types;

pub use duration::{format_duration, parse_duration};
pub use error::{ConfigError, Result};
pub use state_machine::{ExitResult, Transition};
pub use types::{
    CheckId, CheckSpec, CheckState, CheckStatus, DEFAULT_TIMEOUT, Escalation, ExecutionPayload,
    Health,
};
