//! Controller settings.
//!
//! Loaded from an optional TOML file. Every key has a default, so an empty
//! or missing file yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vigil_kube::JobConfig;
use vigil_notify::{DEFAULT_SENDGRID_URL, EmailConfig};
use vigil_reconciler::{ControllerConfig, ReconcilerConfig};

/// Environment variable consulted when the file has no API key.
pub const API_KEY_ENV: &str = "SENDGRID_API_KEY";

/// Settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SettingsError {
    /// Create an invalid setting error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// All controller settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub controller: ControllerSettings,
    pub reconciler: ReconcilerSettings,
    pub backend: BackendSettings,
    pub escalation: EscalationSettings,
}

/// `[controller]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerSettings {
    /// Namespace to watch; all namespaces when unset.
    pub namespace: Option<String>,
    pub max_watch_errors: u32,
    pub shutdown_timeout_secs: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            namespace: None,
            max_watch_errors: 10,
            shutdown_timeout_secs: 30,
        }
    }
}

/// `[reconciler]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcilerSettings {
    pub logs_max_bytes: usize,
    pub status_retry_base_ms: u64,
    pub status_retry_max_ms: u64,
    pub timeout_grace_secs: u64,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            logs_max_bytes: 8192,
            status_retry_base_ms: 500,
            status_retry_max_ms: 30_000,
            timeout_grace_secs: 30,
        }
    }
}

/// `[backend]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSettings {
    pub poll_interval_secs: u64,
    pub config_mount_path: String,
    pub service_account: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3,
            config_mount_path: "/etc/vigil/check".to_string(),
            service_account: None,
        }
    }
}

/// `[escalation]`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EscalationSettings {
    pub subject_prefix: String,
    pub sendgrid_url: String,
    pub from_address: String,
    pub sendgrid_api_key: Option<String>,
}

impl std::fmt::Debug for EscalationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationSettings")
            .field("subject_prefix", &self.subject_prefix)
            .field("sendgrid_url", &self.sendgrid_url)
            .field("from_address", &self.from_address)
            .field(
                "sendgrid_api_key",
                &self.sendgrid_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            subject_prefix: "vigil".to_string(),
            sendgrid_url: DEFAULT_SENDGRID_URL.to_string(),
            from_address: "vigil@localhost".to_string(),
            sendgrid_api_key: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed TOML or unknown keys.
    pub fn parse(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// Fill the API key from `env_key` when the file did not set one.
    #[must_use]
    pub fn with_env_api_key(mut self, env_key: Option<String>) -> Self {
        if self.escalation.sendgrid_api_key.is_none() {
            self.escalation.sendgrid_api_key = env_key.filter(|k| !k.is_empty());
        }
        self
    }

    /// Reject settings the controller cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let positive = [
            ("controller.max_watch_errors", u64::from(self.controller.max_watch_errors)),
            ("controller.shutdown_timeout_secs", self.controller.shutdown_timeout_secs),
            (
                "reconciler.logs_max_bytes",
                u64::try_from(self.reconciler.logs_max_bytes).unwrap_or(u64::MAX),
            ),
            ("reconciler.status_retry_base_ms", self.reconciler.status_retry_base_ms),
            ("reconciler.status_retry_max_ms", self.reconciler.status_retry_max_ms),
            ("backend.poll_interval_secs", self.backend.poll_interval_secs),
        ];
        if let Some(&(field, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(SettingsError::invalid(field, "must be greater than zero"));
        }
        if self.reconciler.status_retry_base_ms > self.reconciler.status_retry_max_ms {
            return Err(SettingsError::invalid(
                "reconciler.status_retry_base_ms",
                "must not exceed status_retry_max_ms",
            ));
        }
        if self.escalation.subject_prefix.trim().is_empty() {
            return Err(SettingsError::invalid(
                "escalation.subject_prefix",
                "must not be empty",
            ));
        }
        if self.backend.config_mount_path.trim().is_empty() {
            return Err(SettingsError::invalid(
                "backend.config_mount_path",
                "must not be empty",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            max_watch_errors: self.controller.max_watch_errors,
            shutdown_timeout: Duration::from_secs(self.controller.shutdown_timeout_secs),
        }
    }

    #[must_use]
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            logs_max_bytes: self.reconciler.logs_max_bytes,
            status_retry_base: Duration::from_millis(self.reconciler.status_retry_base_ms),
            status_retry_max: Duration::from_millis(self.reconciler.status_retry_max_ms),
            timeout_grace: Duration::from_secs(self.reconciler.timeout_grace_secs),
        }
    }

    #[must_use]
    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            poll_interval: Duration::from_secs(self.backend.poll_interval_secs),
            config_mount_path: self.backend.config_mount_path.clone(),
            service_account: self.backend.service_account.clone(),
        }
    }

    #[must_use]
    pub fn email_config(&self) -> EmailConfig {
        EmailConfig {
            endpoint: self.escalation.sendgrid_url.clone(),
            from_address: self.escalation.from_address.clone(),
            api_key: self.escalation.sendgrid_api_key.clone(),
            ..EmailConfig::default()
        }
    }
}
