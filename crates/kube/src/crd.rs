//! The `Check` custom resource.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Desired state of a check, as written by users.
///
/// Durations are strings such as `"90s"`, `"5m"` or `"1h30m"`.
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "vigil.dev", version = "v1", kind = "Check", plural = "checks")]
#[kube(shortname = "chk", namespaced)]
#[kube(status = "CheckResourceStatus")]
#[kube(printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#)]
#[kube(printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#)]
#[kube(printcolumn = r#"{"name":"Attempt","type":"integer","jsonPath":".status.attempt"}"#)]
#[kube(printcolumn = r#"{"name":"Max","type":"integer","jsonPath":".spec.maxAttempts"}"#)]
#[kube(printcolumn = r#"{"name":"Escalations","type":"string","jsonPath":".spec.escalations[*].type"}"#)]
#[kube(printcolumn = r#"{"name":"Last Check","type":"date","jsonPath":".status.lastCheckTimestamp"}"#)]
#[kube(printcolumn = r#"{"name":"Next Check","type":"date","jsonPath":".status.nextCheckTimestamp"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct CheckResourceSpec {
    pub check_interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_interval: Option<String>,
    pub max_attempts: u32,
    #[serde(default)]
    pub escalations: Vec<EscalationSpec>,
    /// Defaults to five minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Secret whose keys are injected as environment variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    /// Config map mounted into the check container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<String>,
    /// Full pod template; replaces `image`, `secretRef` and `configRef`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplateSpec>,
}

/// One escalation entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct EscalationSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// Status subresource, written only by the controller.
///
/// Every field is serialized, `None` as `null`, so a merge patch clears
/// fields that no longer apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckResourceStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub attempt: Option<u32>,
    #[serde(default)]
    pub last_check_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_check_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub last_escalation_timestamp: Option<DateTime<Utc>>,
}
