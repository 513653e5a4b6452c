//! Escalation dispatch.
//!
//! Escalation entries are `{type, args}` pairs. The [`EscalationRegistry`]
//! maps each type string to a handler; supporting a new type means
//! registering one more handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use vigil_core::{CheckId, CheckSpec, CheckStatus, Escalation, Health};

use crate::error::DispatchError;

/// Why a message is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// The check went, or stayed, critical.
    Escalation,
    /// A critical check succeeded again.
    Recovery,
}

/// A rendered notification for one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationMessage {
    pub check: CheckId,
    pub kind: MessageKind,
    pub status: Health,
    pub subject: String,
    pub body: String,
}

impl EscalationMessage {
    /// Render a message from the check's current status.
    #[must_use]
    pub fn render(
        prefix: &str,
        check: &CheckId,
        spec: &CheckSpec,
        status: &CheckStatus,
        kind: MessageKind,
    ) -> Self {
        let subject = format!("{prefix} {}: {check}", status.status);
        let last_check = status
            .last_check_timestamp
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
        let body = format!(
            "Check: {check}\nStatus: {}\nAttempt: {}/{}\nLast check: {last_check}\n\nLogs:\n{}",
            status.status, status.attempt, spec.max_attempts, status.logs
        );
        Self {
            check: check.clone(),
            kind,
            status: status.status,
            subject,
            body,
        }
    }
}

impl fmt::Display for EscalationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.subject)
    }
}

/// Delivers messages for one escalation type.
#[async_trait]
pub trait EscalationHandler: Send + Sync {
    /// Deliver `message` to the target described by `escalation.args`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if delivery fails. The error is logged by
    /// the registry and does not affect other entries.
    async fn send(
        &self,
        escalation: &Escalation,
        message: &EscalationMessage,
    ) -> Result<(), DispatchError>;
}

/// Outcome of dispatching to every configured entry.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: Vec<DispatchError>,
}

impl DispatchReport {
    /// Whether every entry was delivered.
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Maps escalation type strings to handlers.
#[derive(Clone)]
pub struct EscalationRegistry {
    handlers: HashMap<String, Arc<dyn EscalationHandler>>,
    subject_prefix: String,
}

impl fmt::Debug for EscalationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("EscalationRegistry")
            .field("kinds", &kinds)
            .field("subject_prefix", &self.subject_prefix)
            .finish()
    }
}

impl Default for EscalationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationRegistry {
    /// Create an empty registry with the `vigil` subject prefix.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            subject_prefix: "vigil".to_string(),
        }
    }

    /// Register a handler for `kind`, replacing any previous one.
    #[must_use]
    pub fn register(mut self, kind: impl Into<String>, handler: Arc<dyn EscalationHandler>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    /// Set the subject prefix used when rendering messages.
    #[must_use]
    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    /// Subject prefix for rendered messages.
    #[must_use]
    pub fn subject_prefix(&self) -> &str {
        &self.subject_prefix
    }

    /// Whether a handler exists for `kind`.
    #[must_use]
    pub fn supports(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Send `message` to every entry, in order.
    ///
    /// Each entry is attempted regardless of earlier failures.
    pub async fn dispatch(
        &self,
        escalations: &[Escalation],
        message: &EscalationMessage,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for escalation in escalations {
            let result = match self.handlers.get(&escalation.kind) {
                Some(handler) => handler.send(escalation, message).await,
                None => Err(DispatchError::unknown_type(&escalation.kind)),
            };

            match result {
                Ok(()) => {
                    debug!(
                        check = %message.check,
                        target = %escalation.target_summary(),
                        "Escalation delivered"
                    );
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        check = %message.check,
                        target = %escalation.target_summary(),
                        error = %e,
                        "Escalation delivery failed"
                    );
                    report.failed.push(e);
                }
            }
        }

        report
    }
}

/// Writes messages to the controller log. Registered as type `log`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEscalation;

#[async_trait]
impl EscalationHandler for LogEscalation {
    async fn send(
        &self,
        _escalation: &Escalation,
        message: &EscalationMessage,
    ) -> Result<(), DispatchError> {
        warn!(
            check = %message.check,
            kind = ?message.kind,
            status = %message.status,
            "{}",
            message.subject
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vigil_core::ExecutionPayload;

    use super::*;
    use crate::testing::RecordingHandler;

    fn spec() -> CheckSpec {
        CheckSpec::new(
            Duration::from_secs(60),
            3,
            ExecutionPayload::image("busybox"),
        )
    }

    fn message() -> EscalationMessage {
        let status = CheckStatus {
            status: Health::Critical,
            attempt: 3,
            logs: "connection refused".to_string(),
            ..CheckStatus::default()
        };
        EscalationMessage::render(
            "vigil",
            &CheckId::new("default", "web"),
            &spec(),
            &status,
            MessageKind::Escalation,
        )
    }

    #[test]
    fn renders_subject_and_body() {
        let message = message();
        assert_eq!(message.subject, "vigil CRITICAL: default/web");
        assert!(message.body.contains("Attempt: 3/3"));
        assert!(message.body.contains("Last check: never"));
        assert!(message.body.contains("connection refused"));
    }

    #[tokio::test]
    async fn failures_do_not_block_later_entries() {
        let failing = RecordingHandler::failing();
        let ok = RecordingHandler::new();
        let registry = EscalationRegistry::new()
            .register("broken", Arc::new(failing.clone()))
            .register("ok", Arc::new(ok.clone()));

        let entries = vec![
            Escalation::new("broken"),
            Escalation::new("missing"),
            Escalation::new("ok").with_arg("to", "ops"),
        ];
        let report = registry.dispatch(&entries, &message()).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[1], DispatchError::unknown_type("missing"));
        assert_eq!(failing.sent().len(), 1);
        assert_eq!(ok.sent().len(), 1);
    }

    #[tokio::test]
    async fn log_escalation_always_succeeds() {
        let result = LogEscalation.send(&Escalation::new("log"), &message()).await;
        assert!(result.is_ok());
    }
}
