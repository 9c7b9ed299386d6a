//! Partial models of the orchestrator's volume and node records.
//!
//! Only the fields this plugin reads or writes are typed.  Everything else is
//! kept in a flattened `extra` map so a read-modify-write cycle sends the
//! record back intact.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::MetadataError;
use super::quantity::parse_quantity;

/// Annotation recording which node hosts a volume's logical volume.
pub const NODE_ANNOTATION_KEY: &str = "lvm/node";

/// Node label used to build the volume's node affinity.
pub const HOSTNAME_LABEL_KEY: &str = "kubernetes.io/hostname";

/// Capacity key under `spec.capacity`.
pub const STORAGE_RESOURCE: &str = "storage";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Volume record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolume {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PersistentVolumeSpec,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeSpec {
    /// Resource name to quantity string, e.g. `storage: 2Mi`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capacity: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_affinity: Option<VolumeNodeAffinity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeNodeAffinity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<NodeSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelector {
    pub node_selector_terms: Vec<NodeSelectorTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSelectorTerm {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<NodeSelectorRequirement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl PersistentVolume {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Requested capacity in bytes, exactly as recorded.
    pub fn capacity_bytes(&self) -> Result<u64, MetadataError> {
        let quantity = self
            .spec
            .capacity
            .get(STORAGE_RESOURCE)
            .ok_or_else(|| MetadataError::invalid("volume", self.name(), "no storage capacity"))?;
        parse_quantity(quantity)
            .map_err(|e| MetadataError::invalid("volume", self.name(), e.to_string()))
    }

    /// The node recorded as hosting this volume, if any.
    pub fn owning_node(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(NODE_ANNOTATION_KEY)
            .map(String::as_str)
            .filter(|node| !node.is_empty())
    }

    /// Pin the volume to `node_name` with `affinity`.
    pub fn bind_to_node(&mut self, node_name: &str, affinity: VolumeNodeAffinity) {
        self.spec.node_affinity = Some(affinity);
        self.metadata
            .annotations
            .insert(NODE_ANNOTATION_KEY.to_owned(), node_name.to_owned());
    }
}

// ---------------------------------------------------------------------------
// Node record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Affinity restricting a volume to this node, keyed on its hostname label.
    pub fn node_affinity(&self) -> Result<VolumeNodeAffinity, MetadataError> {
        let hostname = self
            .metadata
            .labels
            .get(HOSTNAME_LABEL_KEY)
            .ok_or_else(|| {
                MetadataError::invalid(
                    "node",
                    self.name(),
                    format!("missing expected label {HOSTNAME_LABEL_KEY}"),
                )
            })?;

        Ok(VolumeNodeAffinity {
            required: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: vec![NodeSelectorRequirement {
                        key: HOSTNAME_LABEL_KEY.to_owned(),
                        operator: "In".to_owned(),
                        values: vec![hostname.clone()],
                    }],
                }],
            }),
        })
    }

    /// The node's reachable address: first `InternalIP`, else first `ExternalIP`.
    pub fn host_ip(&self) -> Result<IpAddr, MetadataError> {
        let find = |kind: &str| {
            self.status
                .addresses
                .iter()
                .filter(|a| a.kind == kind)
                .find_map(|a| a.address.parse::<IpAddr>().ok())
        };
        find("InternalIP").or_else(|| find("ExternalIP")).ok_or_else(|| {
            let known: Vec<_> = self
                .status
                .addresses
                .iter()
                .map(|a| format!("{}={}", a.kind, a.address))
                .collect();
            MetadataError::invalid(
                "node",
                self.name(),
                format!("host IP unknown; known addresses: {known:?}"),
            )
        })
    }

    /// `ip:port` of the lvmd daemon on this node.
    pub fn lvmd_address(&self, port: u16) -> Result<String, MetadataError> {
        Ok(SocketAddr::new(self.host_ip()?, port).to_string())
    }
}
