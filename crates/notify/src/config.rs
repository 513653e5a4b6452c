//! Configuration for the email transport.

use std::time::Duration;

use crate::error::{Error, Result};

/// SendGrid v3 mail endpoint.
pub const DEFAULT_SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";

/// Settings for [`crate::EmailEscalation`].
#[derive(Clone, PartialEq, Eq)]
pub struct EmailConfig {
    /// Mail send endpoint.
    pub endpoint: String,

    /// Sender address.
    pub from_address: String,

    /// API key; delivery fails while unset.
    pub api_key: Option<String>,

    /// Request timeout.
    pub timeout: Duration,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("endpoint", &self.endpoint)
            .field("from_address", &self.from_address)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            from_address: default_from_address(),
            api_key: None,
            timeout: default_timeout(),
        }
    }
}

impl EmailConfig {
    /// Set the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the sender address.
    #[must_use]
    pub fn with_from_address(mut self, from: impl Into<String>) -> Self {
        self.from_address = from.into();
        self
    }

    /// Check the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty endpoint or sender, or a zero
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::config("email endpoint must not be empty"));
        }
        if self.from_address.trim().is_empty() {
            return Err(Error::config("email from address must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config("email timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn default_endpoint() -> String {
    DEFAULT_SENDGRID_URL.to_string()
}

fn default_from_address() -> String {
    "vigil@localhost".to_string()
}

const fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_sendgrid() {
        let config = EmailConfig::default();
        assert_eq!(config.endpoint, DEFAULT_SENDGRID_URL);
        assert!(config.api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = EmailConfig::default().with_api_key("SG.secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("SG.secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn rejects_empty_sender() {
        let config = EmailConfig::default().with_from_address(" ");
        assert!(matches!(config.validate(), Err(Error::Config { .. })));
    }
}
