//! Core CSI types: volumes, capabilities, requests, and plugin info.
//!
//! These types form the data model shared by the CSI traits, transport layer,
//! and the LVM backend.  They are all [`Serialize`]/[`Deserialize`] so they
//! can be transmitted over QUIC as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Volume identity
// ---------------------------------------------------------------------------

/// Cluster-wide unique volume name.  Also the logical volume name on the node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VolumeId(pub String);

impl VolumeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for VolumeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VolumeId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Access mode & capabilities
// ---------------------------------------------------------------------------

/// Describes how a volume may be accessed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessMode {
    /// Single-node read-write.
    ReadWriteOnce,
    /// Multi-node read-only.
    ReadOnlyMany,
    /// Multi-node read-write.
    ReadWriteMany,
}

/// Describes the capabilities required from a volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeCapability {
    /// Requested access mode.
    pub access_mode: AccessMode,
    /// Additional mount flags (e.g. `"noatime"`), appended after `ro`/`rw`.
    #[serde(default)]
    pub mount_flags: Vec<String>,
}

impl Default for VolumeCapability {
    fn default() -> Self {
        Self {
            access_mode: AccessMode::ReadWriteOnce,
            mount_flags: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Volume metadata
// ---------------------------------------------------------------------------

/// Requested size bounds in bytes.  Zero means unspecified.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacityRange {
    #[serde(default)]
    pub required_bytes: u64,
    #[serde(default)]
    pub limit_bytes: u64,
}

/// A volume as reported back from `CreateVolume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Unique volume identifier.
    pub volume_id: VolumeId,
    /// Requested capacity in bytes, as given by the caller.
    pub capacity_bytes: u64,
    /// Opaque context passed from Controller to Node operations.
    #[serde(default)]
    pub volume_context: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request to create a new volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    /// Volume name; becomes the volume id.
    pub name: String,
    #[serde(default)]
    pub capacity_range: Option<CapacityRange>,
    /// Required capabilities.
    #[serde(default)]
    pub volume_capabilities: Vec<VolumeCapability>,
    /// Storage class parameters, returned as the volume context.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Request to stage a volume on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStageVolumeRequest {
    pub volume_id: VolumeId,
    pub staging_target_path: String,
    #[serde(default)]
    pub volume_capability: Option<VolumeCapability>,
}

/// Request to make a volume's device present and mounted on this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePublishVolumeRequest {
    /// Volume to publish.
    pub volume_id: VolumeId,
    /// Mount target, e.g. `/var/lib/kubelet/pods/<uid>/volumes/<name>/mount`.
    pub target_path: String,
    /// Requested capability.  Required.
    #[serde(default)]
    pub volume_capability: Option<VolumeCapability>,
    /// Whether the volume should be mounted read-only.
    #[serde(default)]
    pub read_only: bool,
}

// ---------------------------------------------------------------------------
// Plugin & node info
// ---------------------------------------------------------------------------

/// Information about the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name, e.g. `"csi-lvm"`.
    pub name: String,
    /// Vendor-provided version string.
    pub vendor_version: String,
}

/// Capabilities advertised by the CSI plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PluginCapability {
    /// Plugin provides a Controller service.
    ControllerService,
}

/// Information about the node on which the CSI Node service runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier.
    pub node_id: String,
    /// Maximum number of volumes the node can host; `0` means no limit.
    pub max_volumes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_id_display() {
        let id = VolumeId("vol-abc".into());
        assert_eq!(id.to_string(), "vol-abc");
        assert!(!id.is_empty());
    }

    #[test]
    fn publish_request_defaults() {
        let json = r#"{"volume_id":"vol-1","target_path":"/mnt/t"}"#;
        let req: NodePublishVolumeRequest = serde_json::from_str(json).expect("deserialize");
        assert!(!req.read_only);
        assert!(req.volume_capability.is_none());
    }

    #[test]
    fn create_volume_request_default() {
        let req = CreateVolumeRequest::default();
        assert!(req.name.is_empty());
        assert!(req.capacity_range.is_none());
    }

    #[test]
    fn volume_capability_default() {
        let cap = VolumeCapability::default();
        assert_eq!(cap.access_mode, AccessMode::ReadWriteOnce);
        assert!(cap.mount_flags.is_empty());
    }
}
