//! # vigil
//!
//! Kubernetes controller that runs container checks on a schedule and
//! escalates checks that keep failing.
//!
//! The binary wires together:
//!
//! - [`vigil_core`]: check types, the state machine and the scheduler
//! - [`vigil_reconciler`]: per-check tasks and the controller loop
//! - [`vigil_kube`]: the `Check` resource, Job backend, status store and watch
//! - [`vigil_notify`]: email escalations and the default registry

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cli;
pub mod config;
pub mod shutdown;

pub use config::{API_KEY_ENV, Settings, SettingsError};
