//! Cluster metadata accessor.
//!
//! Reads and writes the orchestrator's volume and node records.  Each call is
//! a single round trip: no caching and no retries.  Failures are returned to
//! the caller as a [`MetadataError`] that keeps "not found" apart from other
//! failures so workflows can classify them.

mod apiserver;
mod model;
mod quantity;

use async_trait::async_trait;
use thiserror::Error;

pub use apiserver::{ApiServerClient, ApiServerConfig};
pub use model::{
    HOSTNAME_LABEL_KEY, NODE_ANNOTATION_KEY, Node, NodeAddress, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, NodeStatus, ObjectMeta, PersistentVolume,
    PersistentVolumeSpec, STORAGE_RESOURCE, VolumeNodeAffinity,
};
pub use quantity::{QuantityError, parse_quantity};

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name}: api server returned {status}: {message}")]
    Status {
        kind: &'static str,
        name: String,
        status: u16,
        message: String,
    },

    #[error("invalid {kind} {name}: {reason}")]
    Invalid {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("api server request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("api server client configuration: {0}")]
    Config(String),
}

impl MetadataError {
    pub fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            name: name.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Access to volume and node records.
#[async_trait]
pub trait ClusterMetadata: Send + Sync {
    async fn get_volume(&self, volume_id: &str) -> Result<PersistentVolume, MetadataError>;

    /// Replace the volume record; last write wins.
    async fn update_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<PersistentVolume, MetadataError>;

    async fn get_node(&self, node_name: &str) -> Result<Node, MetadataError>;

    /// Name of the node recorded as hosting the volume, `None` if it was never
    /// materialized.
    async fn get_volume_node(&self, volume_id: &str) -> Result<Option<String>, MetadataError> {
        let volume = self.get_volume(volume_id).await?;
        Ok(volume.owning_node().map(str::to_owned))
    }
}
