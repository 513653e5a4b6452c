//! Per-check state machine.
//!
//! [`apply`] folds one run outcome into a check's status. It is pure: the
//! completion time is an input, and nothing here performs I/O.
//!
//! | outcome | before threshold | at threshold |
//! |---|---|---|
//! | success | OK, attempt 0 | OK, attempt 0 |
//! | failure | UNKNOWN, attempt + 1 | CRITICAL, attempt = max, escalate if not throttled |
//!
//! Timeouts and launch errors count as failures. A failing run on a CRITICAL
//! check stays CRITICAL with `attempt = max`, whatever the previous attempt.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::{CheckSpec, CheckState, CheckStatus, Health};

/// Classified outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitResult {
    /// Payload exited with code 0.
    Success,
    /// Payload exited non-zero.
    Failure,
    /// Payload exceeded its timeout and was terminated.
    Timeout,
    /// The execution unit never started.
    LaunchError,
}

impl ExitResult {
    /// Whether the run counts as a success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Classify a process exit code.
    #[must_use]
    pub const fn from_exit_code(code: i32) -> Self {
        if code == 0 { Self::Success } else { Self::Failure }
    }
}

/// Result of applying one run outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status after the run, with `state` back to idle.
    pub status: CheckStatus,
    /// Whether escalations should be dispatched.
    pub escalation_requested: bool,
    /// Whether a critical check just recovered.
    pub recovered: bool,
}

/// Apply a run outcome to the previous status.
///
/// `now` is the completion time of the run and becomes
/// `last_check_timestamp`. `next_check_timestamp` is left untouched; the
/// scheduler owns it.
#[must_use]
pub fn apply(
    previous: &CheckStatus,
    spec: &CheckSpec,
    outcome: ExitResult,
    now: DateTime<Utc>,
) -> Transition {
    let mut status = previous.clone();
    status.state = CheckState::Idle;
    status.last_check_timestamp = Some(now);

    if outcome.is_success() {
        status.status = Health::Ok;
        status.attempt = 0;
        return Transition {
            status,
            escalation_requested: false,
            recovered: previous.status == Health::Critical,
        };
    }

    // CRITICAL is left only by a success, even if max_attempts was raised.
    let attempt = if previous.status == Health::Critical {
        spec.max_attempts
    } else {
        previous.attempt.saturating_add(1).min(spec.max_attempts)
    };
    status.attempt = attempt;

    if attempt < spec.max_attempts {
        status.status = Health::Unknown;
        return Transition {
            status,
            escalation_requested: false,
            recovered: false,
        };
    }

    status.status = Health::Critical;
    let escalation_requested = escalation_allowed(
        previous.last_escalation_timestamp,
        spec.notification_interval(),
        now,
    );
    if escalation_requested {
        status.last_escalation_timestamp = Some(now);
    }

    Transition {
        status,
        escalation_requested,
        recovered: false,
    }
}

/// Throttle rule: escalate unless the last escalation was less than
/// `interval` before `now`.
#[must_use]
pub fn escalation_allowed(
    last_escalation: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> bool {
    last_escalation.is_none_or(|last| {
        chrono::Duration::from_std(interval)
            .is_ok_and(|interval| now.signed_duration_since(last) >= interval)
    })
}
