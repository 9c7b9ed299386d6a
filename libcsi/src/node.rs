//! CSI Node service trait.
//!
//! The Node service runs on each worker node and makes a volume usable by the
//! workloads scheduled there:
//!
//! 1. **Publish**: create the logical volume on first use, format it if it
//!    carries no filesystem, and mount it at the target path.
//! 2. **Unpublish**: unmount the target path.
//!
//! Stage and unstage are accepted but do nothing.

use async_trait::async_trait;

use crate::error::CsiError;
use crate::types::{NodeInfo, NodePublishVolumeRequest, NodeStageVolumeRequest, VolumeId};

/// Node service: local device and mount operations.
#[async_trait]
pub trait CsiNode: Send + Sync {
    /// Reserved lifecycle hook; always succeeds.
    async fn stage_volume(&self, req: NodeStageVolumeRequest) -> Result<(), CsiError>;

    /// Reserved lifecycle hook; always succeeds.
    async fn unstage_volume(
        &self,
        volume_id: &VolumeId,
        staging_target_path: &str,
    ) -> Result<(), CsiError>;

    /// Publish a volume at `req.target_path`.
    ///
    /// Idempotent: when the device exists and the target is already
    /// mounted the call returns without formatting or mounting again.
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError>;

    /// Unmount a volume from `target_path`.
    ///
    /// A missing target path yields [`CsiError::NotFound`]; a target that
    /// exists but is not a mount point yields [`CsiError::NotMounted`].
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError>;

    /// Return information about the node on which this service is running.
    async fn get_info(&self) -> Result<NodeInfo, CsiError>;
}
