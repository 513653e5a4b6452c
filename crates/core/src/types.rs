//! Core types for checks: identity, spec, and persisted status.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Execution timeout used when a spec does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Stable identity of a check resource (namespace + name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckId {
    namespace: String,
    name: String,
}

impl CheckId {
    /// Create a new check ID.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Namespace of the check resource.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Name of the check resource.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Whether an execution unit is active for a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckState {
    /// No execution unit is active.
    #[default]
    Idle,
    /// An execution unit is active.
    Running,
}

impl CheckState {
    /// Convert to the persisted string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckState {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "IDLE" => Ok(Self::Idle),
            "RUNNING" => Ok(Self::Running),
            other => Err(ConfigError::invalid_field(
                "state",
                format!("unknown state '{other}'"),
            )),
        }
    }
}

/// Externally reported health of a check.
///
/// A check that has failed but not yet reached `max_attempts` reports
/// `Unknown`; `Critical` is reserved for checks past the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Health {
    /// Last run succeeded.
    Ok,
    /// Failed `max_attempts` consecutive times.
    Critical,
    /// Never run, or failing but not yet escalated.
    #[default]
    Unknown,
}

impl Health {
    /// Convert to the persisted string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Health {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OK" => Ok(Self::Ok),
            "CRITICAL" => Ok(Self::Critical),
            "UNKNOWN" | "PENDING" => Ok(Self::Unknown),
            other => Err(ConfigError::invalid_field(
                "status",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

/// One escalation entry: a handler type plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    /// Handler type, e.g. `email`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Handler-specific arguments.
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl Escalation {
    /// Create an escalation with no arguments.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            args: BTreeMap::new(),
        }
    }

    /// Add an argument.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Short description of where this escalation goes, e.g. `email:ops@example.com`.
    #[must_use]
    pub fn target_summary(&self) -> String {
        if self.args.is_empty() {
            self.kind.clone()
        } else {
            format!("{}:{}", self.kind, self.args.values().join(","))
        }
    }
}

/// What a check executes.
///
/// A template override replaces the image/secret/config triad entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionPayload {
    /// A single container built from an image.
    Image {
        /// Container image reference.
        image: String,
        /// Secret whose keys become environment variables.
        secret_ref: Option<String>,
        /// Config map mounted into the container.
        config_ref: Option<String>,
    },
    /// A full pod template, passed through as JSON.
    Template(serde_json::Value),
}

impl ExecutionPayload {
    /// Create an image payload without secret or config.
    pub fn image(image: impl Into<String>) -> Self {
        Self::Image {
            image: image.into(),
            secret_ref: None,
            config_ref: None,
        }
    }
}

/// Desired configuration of a check.
///
/// Replaced wholesale when the resource is updated.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckSpec {
    /// Interval between runs while the check is OK.
    pub check_interval: Duration,
    /// Interval between runs while retrying; defaults to `check_interval`.
    pub retry_interval: Option<Duration>,
    /// Interval between runs, and minimum spacing between escalations, once
    /// critical; defaults to `check_interval`.
    pub notification_interval: Option<Duration>,
    /// Consecutive failures before the check goes critical.
    pub max_attempts: u32,
    /// Escalations fired when the check goes critical, in order.
    pub escalations: Vec<Escalation>,
    /// Maximum run time of one execution.
    pub timeout: Duration,
    /// What to execute.
    pub payload: Option<ExecutionPayload>,
}

impl CheckSpec {
    /// Create a spec with the default timeout and no escalations.
    #[must_use]
    pub fn new(check_interval: Duration, max_attempts: u32, payload: ExecutionPayload) -> Self {
        Self {
            check_interval,
            retry_interval: None,
            notification_interval: None,
            max_attempts,
            escalations: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            payload: Some(payload),
        }
    }

    /// Set the retry interval.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = Some(interval);
        self
    }

    /// Set the notification interval.
    #[must_use]
    pub fn with_notification_interval(mut self, interval: Duration) -> Self {
        self.notification_interval = Some(interval);
        self
    }

    /// Set the execution timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Append an escalation.
    #[must_use]
    pub fn with_escalation(mut self, escalation: Escalation) -> Self {
        self.escalations.push(escalation);
        self
    }

    /// Effective retry interval.
    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval.unwrap_or(self.check_interval)
    }

    /// Effective notification interval.
    #[must_use]
    pub fn notification_interval(&self) -> Duration {
        self.notification_interval.unwrap_or(self.check_interval)
    }

    /// Comma-separated escalation targets, for summaries.
    #[must_use]
    pub fn escalation_summary(&self) -> String {
        self.escalations
            .iter()
            .map(Escalation::target_summary)
            .join(", ")
    }

    /// Validate the spec, returning it unchanged if it can be scheduled.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(self) -> Result<Self> {
        if self.check_interval.is_zero() {
            return Err(ConfigError::non_positive("checkInterval"));
        }
        if self.retry_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::non_positive("retryInterval"));
        }
        if self.notification_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::non_positive("notificationInterval"));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::non_positive("timeout"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::non_positive("maxAttempts"));
        }
        if self.escalations.is_empty() {
            return Err(ConfigError::NoEscalations);
        }
        if let Some(index) = self
            .escalations
            .iter()
            .position(|e| e.kind.trim().is_empty())
        {
            return Err(ConfigError::EmptyEscalationType { index });
        }
        match &self.payload {
            None => return Err(ConfigError::missing_field("image")),
            Some(ExecutionPayload::Image { image, .. }) if image.trim().is_empty() => {
                return Err(ConfigError::missing_field("image"));
            }
            Some(ExecutionPayload::Template(template)) if !template.is_object() => {
                return Err(ConfigError::invalid_field(
                    "template",
                    "pod template must be an object",
                ));
            }
            Some(_) => {}
        }
        Ok(self)
    }
}

/// Persisted, externally visible status of a check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatus {
    /// Whether an execution unit is active.
    pub state: CheckState,
    /// Reported health.
    pub status: Health,
    /// Consecutive failed runs, saturating at `max_attempts`.
    pub attempt: u32,
    /// Completion time of the last run.
    pub last_check_timestamp: Option<DateTime<Utc>>,
    /// When the next run is due.
    pub next_check_timestamp: Option<DateTime<Utc>>,
    /// Bounded output of the last run.
    pub logs: String,
    /// When an escalation was last requested.
    pub last_escalation_timestamp: Option<DateTime<Utc>>,
}

impl CheckStatus {
    /// Status of a freshly created check: idle, unknown, due now.
    #[must_use]
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            next_check_timestamp: Some(now),
            ..Self::default()
        }
    }

    /// Whether an execution unit is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == CheckState::Running
    }
}
