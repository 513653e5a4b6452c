//! Next-run computation.
//!
//! Intervals are measured from the completion of the previous run, so a
//! slow check pushes its own next run back.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::{CheckSpec, CheckStatus, Health};

/// Interval that applies after a run ending in `status`.
#[must_use]
pub fn effective_interval(status: &CheckStatus, spec: &CheckSpec) -> Duration {
    match status.status {
        Health::Ok => spec.check_interval,
        Health::Critical => spec.notification_interval(),
        Health::Unknown => spec.retry_interval(),
    }
}

/// When the check is next due.
///
/// A check that has never completed a run is due at `now`.
#[must_use]
pub fn next_due(status: &CheckStatus, spec: &CheckSpec, now: DateTime<Utc>) -> DateTime<Utc> {
    status.last_check_timestamp.map_or(now, |last| {
        chrono::Duration::from_std(effective_interval(status, spec))
            .ok()
            .and_then(|interval| last.checked_add_signed(interval))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}

/// Whether the check is due at `now`.
#[must_use]
pub fn is_due(status: &CheckStatus, spec: &CheckSpec, now: DateTime<Utc>) -> bool {
    next_due(status, spec, now) <= now
}
