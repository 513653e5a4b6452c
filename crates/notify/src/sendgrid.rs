//! Email escalations through the SendGrid v3 mail API.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};
use vigil_core::Escalation;
use vigil_reconciler::{DispatchError, EscalationHandler, EscalationMessage};

use crate::config::EmailConfig;
use crate::error::Result;

/// Escalation type handled by [`EmailEscalation`].
pub const EMAIL_TYPE: &str = "email";

/// Argument holding comma-separated recipients.
pub const EMAIL_ARG: &str = "email";

/// Sends escalation messages as plain-text email.
#[derive(Debug, Clone)]
pub struct EmailEscalation {
    config: Arc<EmailConfig>,
    http_client: reqwest::Client,
}

impl EmailEscalation {
    /// Create a handler with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the client cannot be built.
    pub fn new(config: EmailConfig) -> Result<Self> {
        config.validate()?;
        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config: Arc::new(config),
            http_client,
        })
    }
}

/// Recipients listed in an escalation's `email` argument.
///
/// # Errors
///
/// Returns [`DispatchError::MissingArg`] when the argument is absent or
/// lists no address.
pub fn recipients(escalation: &Escalation) -> std::result::Result<Vec<String>, DispatchError> {
    let addresses: Vec<String> = escalation
        .args
        .get(EMAIL_ARG)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if addresses.is_empty() {
        return Err(DispatchError::missing_arg(&escalation.kind, EMAIL_ARG));
    }
    Ok(addresses)
}

/// SendGrid request body for one message.
#[must_use]
pub fn mail_payload(from: &str, to: &[String], message: &EscalationMessage) -> Value {
    let to: Vec<Value> = to.iter().map(|address| json!({ "email": address })).collect();
    json!({
        "personalizations": [{ "to": to }],
        "from": { "email": from },
        "subject": message.subject,
        "content": [{ "type": "text/plain", "value": message.body }],
    })
}

#[async_trait]
impl EscalationHandler for EmailEscalation {
    async fn send(
        &self,
        escalation: &Escalation,
        message: &EscalationMessage,
    ) -> std::result::Result<(), DispatchError> {
        let to = recipients(escalation)?;
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(DispatchError::delivery_failed(
                &escalation.kind,
                "no SendGrid API key configured",
            ));
        };

        debug!(check = %message.check, recipients = to.len(), "Sending email");
        let response = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&mail_payload(&self.config.from_address, &to, message))
            .send()
            .await
            .map_err(|e| DispatchError::delivery_failed(&escalation.kind, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::delivery_failed(
                &escalation.kind,
                format!("SendGrid returned {status}: {body}"),
            ));
        }

        info!(check = %message.check, to = %to.join(","), subject = %message.subject, "Email sent");
        Ok(())
    }
}
