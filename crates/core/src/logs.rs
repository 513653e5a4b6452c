//! Bounding of captured payload output for `status.logs`.
//!
//! Output is truncated from the front so the end of the run, usually the
//! interesting part, is kept. Timeout and launch-error markers go first and
//! are never truncated away; an oversized marker detail is cut instead.

use crate::error::ConfigError;
use crate::state_machine::ExitResult;

/// Prefix for controller-generated lines in `status.logs`.
pub const MARKER_PREFIX: &str = "[vigil]";

const TRUNCATED: &str = "...(truncated)\n";

/// Marker line for an outcome, if it gets one.
#[must_use]
pub fn marker(outcome: ExitResult, detail: &str) -> Option<String> {
    let label = match outcome {
        ExitResult::Timeout => "TIMEOUT",
        ExitResult::LaunchError => "LAUNCH ERROR",
        ExitResult::Success | ExitResult::Failure => return None,
    };
    if detail.is_empty() {
        Some(format!("{MARKER_PREFIX} {label}\n"))
    } else {
        Some(format!("{MARKER_PREFIX} {label}: {detail}\n"))
    }
}

/// `status.logs` value for a check whose spec cannot be scheduled.
#[must_use]
pub fn invalid_spec(error: &ConfigError) -> String {
    format!("{MARKER_PREFIX} invalid check spec: {error}\n")
}

/// Whether `logs` was written by [`invalid_spec`].
#[must_use]
pub fn is_invalid_spec(logs: &str) -> bool {
    logs.starts_with(MARKER_PREFIX) && logs.contains("invalid check spec")
}

/// Keep at most `max_bytes` of `output`, dropping from the front.
///
/// The cut is moved forward to a char boundary, so the result may be a few
/// bytes shorter than the budget.
#[must_use]
pub fn tail(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output.to_string();
    }
    if max_bytes <= TRUNCATED.len() {
        return String::new();
    }

    let budget = max_bytes - TRUNCATED.len();
    let kept = (output.len() - budget..=output.len())
        .find_map(|start| output.get(start..))
        .unwrap_or_default();

    let mut out = String::with_capacity(max_bytes);
    out.push_str(TRUNCATED);
    out.push_str(kept);
    out
}

/// Longest prefix of `s` that fits in `max_bytes` and ends on a char boundary.
fn head(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    (0..=max_bytes)
        .rev()
        .find_map(|end| s.get(..end))
        .unwrap_or_default()
}

/// Marker line cut down to `max_bytes`, keeping the label ahead of the detail.
fn bounded_marker(marker: String, max_bytes: usize) -> String {
    if marker.len() <= max_bytes {
        return marker;
    }
    // Drop the trailing newline, cut, then put it back.
    let line = marker.trim_end_matches('\n');
    let mut out = head(line, max_bytes.saturating_sub(1)).to_string();
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Build the `status.logs` value for a finished run.
///
/// `detail` describes a timeout or launch error and is ignored otherwise.
/// The result never exceeds `max_bytes`.
#[must_use]
pub fn render(outcome: ExitResult, detail: &str, output: &str, max_bytes: usize) -> String {
    match marker(outcome, detail).map(|m| bounded_marker(m, max_bytes)) {
        Some(marker) => {
            let rest = max_bytes.saturating_sub(marker.len());
            let mut out = marker;
            out.push_str(&tail(output, rest));
            out
        }
        None => tail(output, max_bytes),
    }
}
