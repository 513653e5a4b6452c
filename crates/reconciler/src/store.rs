//! Status persistence interface.

use async_trait::async_trait;
use vigil_core::{CheckId, CheckStatus};

use crate::error::StoreError;

/// Writes a check's status back to the resource store.
///
/// The reconciler never has two writes outstanding for the same check.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Persist `status` as the check's full status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write is not acknowledged; the caller
    /// retries with backoff.
    async fn write_status(&self, check: &CheckId, status: &CheckStatus) -> Result<(), StoreError>;
}
