//! Node service: lazy creation, formatting and mounting of volumes.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use liblvmd::LvmOptions;
use tracing::{debug, info, instrument};

use super::{LvmDriver, require_volume_id};
use crate::error::CsiError;
use crate::node::CsiNode;
use crate::types::*;

impl LvmDriver {
    /// Create the logical volume on this node's lvmd and record the binding.
    ///
    /// Must run under the volume's publish lock.
    #[instrument(skip(self))]
    async fn create_and_bind(&self, volume_id: &VolumeId) -> Result<(), CsiError> {
        let mut volume = self
            .metadata
            .get_volume(volume_id.as_str())
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CsiError::InvalidArgument(format!("failed to get volume record: {e}"))
                } else {
                    CsiError::metadata(e)
                }
            })?;

        let node = self
            .metadata
            .get_node(&self.config.node_id)
            .await
            .map_err(CsiError::metadata)?;
        let affinity = node.node_affinity().map_err(CsiError::metadata)?;
        let size = volume.capacity_bytes().map_err(CsiError::metadata)?;
        let addr = node
            .lvmd_address(self.config.lvmd_port)
            .map_err(CsiError::metadata)?;

        let conn = self
            .connector
            .connect(&addr)
            .await
            .map_err(|e| CsiError::DaemonError(format!("failed to connect to {addr}: {e}")))?;
        let output = conn
            .create_lv(&LvmOptions {
                volume_group: self.config.volume_group.clone(),
                name: volume_id.to_string(),
                size,
                tags: Vec::new(),
            })
            .await
            .map_err(|e| CsiError::DaemonError(format!("failed to create volume: {e}")))?;
        drop(conn);
        debug!(%output, size, "logical volume created");

        volume.bind_to_node(&self.config.node_id, affinity);
        self.metadata
            .update_volume(&volume)
            .await
            .map_err(|e| CsiError::MetadataError(format!("failed to record owning node: {e}")))?;
        info!(node = %self.config.node_id, size, "volume bound to node");
        Ok(())
    }
}

#[async_trait]
impl CsiNode for LvmDriver {
    async fn stage_volume(&self, _req: NodeStageVolumeRequest) -> Result<(), CsiError> {
        Ok(())
    }

    async fn unstage_volume(
        &self,
        _volume_id: &VolumeId,
        _staging_target_path: &str,
    ) -> Result<(), CsiError> {
        Ok(())
    }

    #[instrument(skip(self, req), fields(volume_id = %req.volume_id, target = %req.target_path))]
    async fn publish_volume(&self, req: NodePublishVolumeRequest) -> Result<(), CsiError> {
        require_volume_id(&req.volume_id)?;
        if req.target_path.is_empty() {
            return Err(CsiError::InvalidArgument("target path cannot be empty".into()));
        }
        let Some(capability) = req.volume_capability.as_ref() else {
            return Err(CsiError::InvalidArgument(
                "volume capability cannot be empty".into(),
            ));
        };

        let device = self.device_path(&req.volume_id);
        let _serialized = self.publishing.lock(req.volume_id.as_str()).await;
        let present = self.mounter.path_exists(&device).await.map_err(|e| {
            CsiError::Internal(format!("failed to probe {}: {e}", device.display()))
        })?;
        if !present {
            self.create_and_bind(&req.volume_id).await?;
        }

        let target = Path::new(&req.target_path);
        let not_mounted = match self.mounter.is_likely_not_mount_point(target).await {
            Ok(not_mounted) => not_mounted,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.mounter.make_dir(target).await.map_err(|e| {
                    CsiError::Internal(format!("failed to create {}: {e}", req.target_path))
                })?;
                true
            }
            Err(e) => {
                return Err(CsiError::Internal(format!(
                    "failed to probe {}: {e}",
                    req.target_path
                )));
            }
        };
        if !not_mounted {
            debug!("target already mounted");
            return Ok(());
        }

        let mut fs_type = self.fs.detect_filesystem_type(&device).await?;
        if fs_type.is_empty() {
            fs_type = self.config.default_fs_type.clone();
            self.fs.format_device(&device, &fs_type).await?;
            info!(%fs_type, "device formatted");
        }

        let mut options = vec![if req.read_only { "ro" } else { "rw" }.to_owned()];
        options.extend(capability.mount_flags.iter().cloned());
        self.mounter
            .mount(&device, target, &fs_type, &options)
            .await?;
        info!(device = %device.display(), %fs_type, "volume published");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unpublish_volume(
        &self,
        volume_id: &VolumeId,
        target_path: &str,
    ) -> Result<(), CsiError> {
        require_volume_id(volume_id)?;
        if target_path.is_empty() {
            return Err(CsiError::InvalidArgument("target path cannot be empty".into()));
        }

        let target = Path::new(target_path);
        match self.mounter.is_likely_not_mount_point(target).await {
            Ok(false) => {}
            Ok(true) => return Err(CsiError::NotMounted(target_path.to_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CsiError::NotFound(format!("target path {target_path}")));
            }
            Err(e) => {
                return Err(CsiError::Internal(format!(
                    "failed to probe {target_path}: {e}"
                )));
            }
        }

        self.mounter.unmount_path(target).await?;
        info!("volume unpublished");
        Ok(())
    }

    async fn get_info(&self) -> Result<NodeInfo, CsiError> {
        Ok(NodeInfo {
            node_id: self.config.node_id.clone(),
            max_volumes: 0,
        })
    }
}
