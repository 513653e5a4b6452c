//! Escalation transports for vigil.
//!
//! [`EmailEscalation`] delivers messages through SendGrid;
//! [`default_registry`] wires it up next to the built-in `log` handler.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod registry;
pub mod sendgrid;

pub use config::{DEFAULT_SENDGRID_URL, EmailConfig};
pub use error::{Error, Result};
pub use registry::{LOG_TYPE, default_registry};
pub use sendgrid::{EMAIL_ARG, EMAIL_TYPE, EmailEscalation};
