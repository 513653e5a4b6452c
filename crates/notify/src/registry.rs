//! Default escalation registry.

use std::sync::Arc;

use vigil_reconciler::{EscalationRegistry, LogEscalation};

use crate::config::EmailConfig;
use crate::error::Result;
use crate::sendgrid::{EMAIL_TYPE, EmailEscalation};

/// Escalation type handled by [`LogEscalation`].
pub const LOG_TYPE: &str = "log";

/// Registry with the `email` and `log` handlers.
///
/// # Errors
///
/// Returns an error if the email transport cannot be built.
pub fn default_registry(email: EmailConfig, subject_prefix: &str) -> Result<EscalationRegistry> {
    Ok(EscalationRegistry::new()
        .with_subject_prefix(subject_prefix)
        .register(LOG_TYPE, Arc::new(LogEscalation))
        .register(EMAIL_TYPE, Arc::new(EmailEscalation::new(email)?)))
}
