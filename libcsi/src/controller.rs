//! CSI Controller service trait.
//!
//! The Controller service handles the volume lifecycle events the orchestrator
//! raises once per volume: creation and deletion.  Creation only records the
//! request; the backing logical volume is materialized lazily by the Node
//! service on first publish.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{CreateVolumeRequest, Volume, VolumeCapability, VolumeId};

/// Controller service: centralized volume management.
#[async_trait]
pub trait CsiController: Send + Sync {
    /// Accept a new volume.
    ///
    /// The returned [`Volume`] carries the id that subsequent Node operations
    /// use.  The requested capacity is passed through unchanged.
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError>;

    /// Remove the volume's backing storage from whichever node owns it.
    ///
    /// Idempotent: a volume that was never materialized, or whose logical
    /// volume is already gone, deletes successfully.
    async fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), CsiError>;

    /// Check whether the given capabilities are compatible with the volume.
    async fn validate_volume_capabilities(
        &self,
        volume_id: &VolumeId,
        capabilities: &[VolumeCapability],
    ) -> Result<bool, CsiError>;
}
