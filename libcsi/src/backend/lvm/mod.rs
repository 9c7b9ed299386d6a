//! LVM storage backend for CSI.
//!
//! [`LvmDriver`] implements [`CsiIdentity`], [`CsiController`], and
//! [`CsiNode`] by driving the `lvmd` daemon on each node and recording which
//! node owns a volume in the orchestrator's volume record.
//!
//! # Volume lifecycle
//!
//! ```text
//! CreateVolume            accept the request, nothing is allocated
//! NodePublishVolume       on the node the workload landed on:
//!   /dev/<vg>/<id> absent   -> CreateLV on the local lvmd, bind volume to node
//!   no filesystem           -> mkfs
//!   target not mounted      -> mount
//! NodeUnpublishVolume     unmount the target
//! DeleteVolume            RemoveLV on the owning node's lvmd, if any
//! ```
//!
//! Creation is deferred to the first publish because the scheduler, not this
//! plugin, decides which node a workload runs on.

mod controller;
mod locks;
mod node;
#[cfg(test)]
mod testutil;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use liblvmd::LvmConnector;

use crate::error::CsiError;
use crate::host::{FilesystemTool, Mounter, ShellFilesystemTool, SystemMounter};
use crate::identity::CsiIdentity;
use crate::metadata::{ClusterMetadata, MetadataError};
use crate::types::*;

use locks::VolumeLocks;

/// Filesystem created on devices that carry none.
pub const DEFAULT_FS_TYPE: &str = "ext4";

/// Volume group holding every logical volume this plugin creates.
pub const DEFAULT_VOLUME_GROUP: &str = "lvmvg";

/// Port lvmd listens on.
pub const DEFAULT_LVMD_PORT: u16 = 1736;

pub const DEFAULT_DRIVER_NAME: &str = "csi-lvm";

/// Static configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct LvmDriverConfig {
    /// Name reported by `GetPluginInfo`.
    pub driver_name: String,
    /// Name of the node this process runs on; matches its node record.
    pub node_id: String,
    pub volume_group: String,
    pub lvmd_port: u16,
    /// Directory containing `<vg>/<lv>` device nodes.
    pub device_dir: PathBuf,
    pub default_fs_type: String,
}

impl LvmDriverConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            driver_name: DEFAULT_DRIVER_NAME.to_owned(),
            node_id: node_id.into(),
            volume_group: DEFAULT_VOLUME_GROUP.to_owned(),
            lvmd_port: DEFAULT_LVMD_PORT,
            device_dir: PathBuf::from("/dev"),
            default_fs_type: DEFAULT_FS_TYPE.to_owned(),
        }
    }
}

/// CSI backend provisioning LVM logical volumes.
pub struct LvmDriver {
    config: LvmDriverConfig,
    metadata: Arc<dyn ClusterMetadata>,
    connector: Arc<dyn LvmConnector>,
    mounter: Arc<dyn Mounter>,
    fs: Arc<dyn FilesystemTool>,
    /// Serializes publish per volume id on this node.
    publishing: VolumeLocks,
}

impl LvmDriver {
    /// Create a driver acting on the local host.
    pub fn new(
        config: LvmDriverConfig,
        metadata: Arc<dyn ClusterMetadata>,
        connector: Arc<dyn LvmConnector>,
    ) -> Self {
        Self::with_host(
            config,
            metadata,
            connector,
            Arc::new(SystemMounter::default()),
            Arc::new(ShellFilesystemTool::default()),
        )
    }

    /// Create a driver with explicit host helpers.
    pub fn with_host(
        config: LvmDriverConfig,
        metadata: Arc<dyn ClusterMetadata>,
        connector: Arc<dyn LvmConnector>,
        mounter: Arc<dyn Mounter>,
        fs: Arc<dyn FilesystemTool>,
    ) -> Self {
        Self {
            config,
            metadata,
            connector,
            mounter,
            fs,
            publishing: VolumeLocks::default(),
        }
    }

    pub fn config(&self) -> &LvmDriverConfig {
        &self.config
    }

    /// Device node of a volume on this node: `<device_dir>/<vg>/<volume id>`.
    pub fn device_path(&self, volume_id: &VolumeId) -> PathBuf {
        self.config
            .device_dir
            .join(&self.config.volume_group)
            .join(volume_id.as_str())
    }

    /// lvmd address of `node_name`, from its node record.
    async fn lvmd_address(&self, node_name: &str) -> Result<String, MetadataError> {
        let node = self.metadata.get_node(node_name).await?;
        node.lvmd_address(self.config.lvmd_port)
    }
}

fn require_volume_id(volume_id: &VolumeId) -> Result<(), CsiError> {
    if volume_id.is_empty() {
        return Err(CsiError::InvalidArgument("volume id cannot be empty".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CsiIdentity
// ---------------------------------------------------------------------------

#[async_trait]
impl CsiIdentity for LvmDriver {
    async fn get_plugin_info(&self) -> Result<PluginInfo, CsiError> {
        Ok(PluginInfo {
            name: self.config.driver_name.clone(),
            vendor_version: env!("CARGO_PKG_VERSION").to_owned(),
        })
    }

    async fn probe(&self) -> Result<bool, CsiError> {
        Ok(true)
    }

    async fn get_plugin_capabilities(&self) -> Result<Vec<PluginCapability>, CsiError> {
        Ok(vec![PluginCapability::ControllerService])
    }
}
