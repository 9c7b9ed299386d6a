//! # liblvmd: client for the per-node LVM daemon
//!
//! Every node that hosts volumes runs an `lvmd` daemon exposing a small gRPC
//! service (`proto.LVM`) that creates, lists and removes logical volumes in a
//! local volume group.  This crate provides:
//!
//! | Module | Purpose |
//! |---|---|
//! | [`proto`] | Protobuf messages and a tonic client for `proto.LVM`. |
//! | [`connection`] | [`connect`] with a bounded readiness wait, and the [`LvmConnection`] / [`LvmConnector`] seams. |
//! | [`error`] | [`LvmdError`]. |
//!
//! Connections are scoped: open one, issue calls, drop it.  Nothing is pooled.

pub mod connection;
pub mod error;
pub mod proto;

pub use connection::{
    DEFAULT_CONNECT_TIMEOUT, GrpcConnector, LvmConnection, LvmConnector, LvmOptions,
    LvmdConnection, connect,
};
pub use error::LvmdError;
pub use proto::LogicalVolume;

// Callers build and inspect statuses without depending on tonic directly.
pub use tonic::{Code, Status};
