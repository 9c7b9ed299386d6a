//! QUIC transport layer for CSI messages.
//!
//! This module provides [`CsiClient`](client::CsiClient) and
//! [`CsiServer`](server::CsiServer) that exchange [`CsiMessage`](crate::CsiMessage)
//! values over QUIC bi-directional streams using `quinn`.

pub mod client;
pub mod server;
pub mod tls;

/// Upper bound on a single serialized message.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
