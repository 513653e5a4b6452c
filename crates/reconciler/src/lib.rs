//! Reconciliation engine for vigil checks.
//!
//! This crate drives the pure logic in `vigil-core` against the outside
//! world:
//!
//! - **Collaborators**: [`ExecutionBackend`] runs payloads, [`StatusStore`]
//!   persists status, [`EscalationRegistry`] delivers notifications
//! - **Reconciler**: one task per check, see [`reconciler`]
//! - **Controller**: maps watch events to reconciler tasks, see [`Controller`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vigil_reconciler::{
//!     Controller, ControllerConfig, EscalationRegistry, LogEscalation, ReconcilerConfig,
//!     ReconcilerContext, SystemClock,
//! };
//!
//! let ctx = ReconcilerContext {
//!     backend: Arc::new(my_backend),
//!     store: Arc::new(my_store),
//!     escalations: Arc::new(EscalationRegistry::new().register("log", Arc::new(LogEscalation))),
//!     clock: Arc::new(SystemClock),
//!     config: ReconcilerConfig::default(),
//! };
//! Controller::new(ctx, ControllerConfig::default())
//!     .run(watch_stream, shutdown_signal)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backend;
pub mod clock;
pub mod controller;
pub mod error;
pub mod escalation;
pub mod reconciler;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{ExecutionBackend, ExecutionRequest, ExecutionResult};
pub use clock::{Clock, SystemClock, TokioClock};
pub use controller::{CheckObject, Controller, ControllerConfig, WatchEvent};
pub use error::{BackendError, DispatchError, Error, Result, StoreError, WatchError};
pub use escalation::{
    DispatchReport, EscalationHandler, EscalationMessage, EscalationRegistry, LogEscalation,
    MessageKind,
};
pub use reconciler::{CheckEvent, ReconcilerConfig, ReconcilerContext, ReconcilerHandle};
pub use store::StatusStore;
