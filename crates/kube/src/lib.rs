//! Kubernetes integration for vigil.
//!
//! Implements the reconciler's collaborators against a cluster:
//!
//! - [`crd`]: the `Check` custom resource
//! - [`job`]: runs checks as Jobs ([`KubeJobBackend`])
//! - [`status`]: persists status through the status subresource ([`KubeStatusStore`])
//! - [`watch`]: turns the resource watch into controller events ([`watch_checks`])
//! - [`manifests`]: CRD and install YAML

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod convert;
pub mod crd;
pub mod error;
pub mod job;
pub mod manifests;
pub mod status;
pub mod watch;

pub use convert::{check_id, check_object};
pub use crd::{Check, CheckResourceSpec, CheckResourceStatus, EscalationSpec};
pub use error::{Error, Result};
pub use job::{JobConfig, KubeJobBackend};
pub use manifests::{InstallOptions, crd_yaml, install_manifests};
pub use status::KubeStatusStore;
pub use watch::watch_checks;
