//! Controller service: volume acceptance, deletion and capability checks.

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{LvmDriver, require_volume_id};
use crate::controller::CsiController;
use crate::error::CsiError;
use crate::types::*;

#[async_trait]
impl CsiController for LvmDriver {
    #[instrument(skip(self), fields(name = %req.name))]
    async fn create_volume(&self, req: CreateVolumeRequest) -> Result<Volume, CsiError> {
        if req.name.is_empty() {
            return Err(CsiError::InvalidArgument("volume name cannot be empty".into()));
        }
        if req.volume_capabilities.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volume capabilities cannot be empty".into(),
            ));
        }

        // Nothing is allocated here; the owning node creates the logical
        // volume on first publish.
        let volume = Volume {
            volume_id: VolumeId(req.name),
            capacity_bytes: req.capacity_range.map_or(0, |r| r.required_bytes),
            volume_context: req.parameters,
        };
        debug!(volume_id = %volume.volume_id, capacity = volume.capacity_bytes, "volume accepted");
        Ok(volume)
    }

    #[instrument(skip(self))]
    async fn delete_volume(&self, volume_id: &VolumeId) -> Result<(), CsiError> {
        require_volume_id(volume_id)?;

        let owner = self
            .metadata
            .get_volume_node(volume_id.as_str())
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CsiError::InvalidArgument(format!("failed to get owning node of {volume_id}: {e}"))
                } else {
                    CsiError::metadata(e)
                }
            })?;

        let Some(node) = owner else {
            debug!("volume was never materialized, nothing to delete");
            return Ok(());
        };

        let addr = self.lvmd_address(&node).await.map_err(|e| {
            if e.is_not_found() {
                CsiError::InvalidArgument(format!("failed to resolve lvmd address of {node}: {e}"))
            } else {
                CsiError::metadata(e)
            }
        })?;

        let conn = self
            .connector
            .connect(&addr)
            .await
            .map_err(|e| CsiError::DaemonError(format!("failed to connect to {addr}: {e}")))?;

        let vg = &self.config.volume_group;
        match conn.get_lv(vg, volume_id.as_str()).await {
            Ok(lv) => {
                conn.remove_lv(vg, volume_id.as_str())
                    .await
                    .map_err(|e| CsiError::DaemonError(format!("failed to remove volume: {e}")))?;
                info!(%node, size = lv.size, "logical volume removed");
            }
            Err(e) if e.is_not_found() => {
                debug!(%node, "logical volume already gone");
            }
            Err(e) => return Err(CsiError::daemon(e)),
        }
        Ok(())
    }

    #[instrument(skip(self, capabilities))]
    async fn validate_volume_capabilities(
        &self,
        volume_id: &VolumeId,
        capabilities: &[VolumeCapability],
    ) -> Result<bool, CsiError> {
        require_volume_id(volume_id)?;
        if capabilities.is_empty() {
            return Err(CsiError::InvalidArgument(
                "volume capabilities cannot be empty".into(),
            ));
        }

        self.metadata
            .get_volume(volume_id.as_str())
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CsiError::NotFound(format!("volume {volume_id}"))
                } else {
                    CsiError::metadata(e)
                }
            })?;

        // A logical volume lives on exactly one node.
        Ok(capabilities
            .iter()
            .all(|c| c.access_mode == AccessMode::ReadWriteOnce))
    }
}
