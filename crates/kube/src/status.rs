//! Status store backed by the `Check` status subresource.

use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, Patch, PatchParams};
use serde_json::{Value, json};
use tracing::debug;
use vigil_core::{CheckId, CheckStatus};
use vigil_reconciler::{StatusStore, StoreError};

use crate::crd::{Check, CheckResourceStatus};

/// Writes status with a JSON merge patch on `/status`.
#[derive(Clone)]
pub struct KubeStatusStore {
    client: Client,
}

impl KubeStatusStore {
    /// Create a store using `client`.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Merge patch body replacing the whole status.
///
/// Absent optional fields are sent as `null` so stale values are removed.
#[must_use]
pub fn status_patch(status: &CheckStatus) -> Value {
    json!({ "status": CheckResourceStatus::from(status) })
}

#[async_trait]
impl StatusStore for KubeStatusStore {
    async fn write_status(&self, check: &CheckId, status: &CheckStatus) -> Result<(), StoreError> {
        let api: Api<Check> = Api::namespaced(self.client.clone(), check.namespace());
        api.patch_status(
            check.name(),
            &PatchParams::default(),
            &Patch::Merge(status_patch(status)),
        )
        .await
        .map_err(|e| StoreError::new(check.to_string(), e.to_string()))?;
        debug!(check = %check, state = %status.state, status = %status.status, "Patched status");
        Ok(())
    }
}
