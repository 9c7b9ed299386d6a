//! # libcsi: LVM-backed CSI over QUIC for RK8s
//!
//! `libcsi` implements a lightweight [Container Storage Interface][csi] layer
//! that uses QUIC (via [`quinn`]) instead of gRPC for transport.  Volumes are
//! LVM logical volumes, created lazily on the node a workload is scheduled
//! to through that node's `lvmd` daemon (see [`liblvmd`]).
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`types`] | Core data model: `Volume`, `VolumeId`, capabilities, requests. |
//! | [`error`] | [`CsiError`] and the status classes it maps onto. |
//! | [`message`] | [`CsiMessage`] protocol envelope for QUIC transport. |
//! | [`identity`] | [`CsiIdentity`] trait: plugin discovery and health. |
//! | [`controller`] | [`CsiController`] trait: volume create, delete, validation. |
//! | [`node`] | [`CsiNode`] trait: stage, publish, unpublish, unstage. |
//! | [`metadata`] | Volume and node records kept by the orchestrator. |
//! | [`host`] | Filesystem detection, formatting, and mounts on the local host. |
//! | [`transport`] | QUIC client/server built on `quinn`. |
//! | [`backend`] | The LVM backend tying it all together. |
//!
//! [csi]: https://github.com/container-storage-interface/spec

pub mod backend;
pub mod controller;
pub mod error;
pub mod host;
pub mod identity;
pub mod message;
pub mod metadata;
pub mod node;
pub mod transport;
pub mod types;

// Re-export the most commonly used items at crate root for convenience.
pub use backend::lvm::{LvmDriver, LvmDriverConfig};
pub use controller::CsiController;
pub use error::{CsiError, StatusCode};
pub use identity::CsiIdentity;
pub use message::CsiMessage;
pub use node::CsiNode;
pub use types::*;
