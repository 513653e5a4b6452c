//! Conversion between the `Check` resource and core types.

use kube::ResourceExt;
use tracing::warn;
use vigil_core::{
    CheckId, CheckSpec, CheckState, CheckStatus, ConfigError, DEFAULT_TIMEOUT, Escalation,
    ExecutionPayload, Health, parse_duration,
};
use vigil_reconciler::CheckObject;

use crate::crd::{Check, CheckResourceSpec, CheckResourceStatus};

impl CheckResourceSpec {
    /// Parse and validate into a core spec.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed durations or a spec that fails
    /// validation.
    pub fn to_core(&self) -> Result<CheckSpec, ConfigError> {
        let optional = |value: &Option<String>| value.as_deref().map(parse_duration).transpose();

        let payload = match (&self.template, &self.image) {
            (Some(template), _) => Some(ExecutionPayload::Template(
                serde_json::to_value(template)
                    .map_err(|e| ConfigError::invalid_field("template", e.to_string()))?,
            )),
            (None, Some(image)) => Some(ExecutionPayload::Image {
                image: image.clone(),
                secret_ref: self.secret_ref.clone(),
                config_ref: self.config_ref.clone(),
            }),
            (None, None) => None,
        };

        CheckSpec {
            check_interval: parse_duration(&self.check_interval)?,
            retry_interval: optional(&self.retry_interval)?,
            notification_interval: optional(&self.notification_interval)?,
            max_attempts: self.max_attempts,
            escalations: self
                .escalations
                .iter()
                .map(|e| Escalation {
                    kind: e.kind.clone(),
                    args: e.args.clone(),
                })
                .collect(),
            timeout: optional(&self.timeout)?.unwrap_or(DEFAULT_TIMEOUT),
            payload,
        }
        .validate()
    }
}

impl CheckResourceStatus {
    /// Read a persisted status, tolerating unknown or missing values.
    #[must_use]
    pub fn to_core(&self) -> CheckStatus {
        CheckStatus {
            state: self
                .state
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(CheckState::Idle),
            status: self
                .status
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Health::Unknown),
            attempt: self.attempt.unwrap_or(0),
            last_check_timestamp: self.last_check_timestamp,
            next_check_timestamp: self.next_check_timestamp,
            logs: self.logs.clone().unwrap_or_default(),
            last_escalation_timestamp: self.last_escalation_timestamp,
        }
    }
}

impl From<&CheckStatus> for CheckResourceStatus {
    fn from(status: &CheckStatus) -> Self {
        Self {
            state: Some(status.state.to_string()),
            status: Some(status.status.to_string()),
            attempt: Some(status.attempt),
            last_check_timestamp: status.last_check_timestamp,
            next_check_timestamp: status.next_check_timestamp,
            logs: Some(status.logs.clone()),
            last_escalation_timestamp: status.last_escalation_timestamp,
        }
    }
}

/// Identity of a check resource, if it has a namespace.
#[must_use]
pub fn check_id(check: &Check) -> Option<CheckId> {
    check
        .namespace()
        .map(|namespace| CheckId::new(namespace, check.name_any()))
}

/// Build the controller's view of a check resource.
///
/// Returns `None` for objects without a namespace.
#[must_use]
pub fn check_object(check: &Check) -> Option<CheckObject> {
    let Some(id) = check_id(check) else {
        warn!(name = %check.name_any(), "Ignoring check without a namespace");
        return None;
    };
    Some(CheckObject {
        id,
        spec: check.spec.to_core(),
        status: check.status.as_ref().map(CheckResourceStatus::to_core),
    })
}
