//! Errors returned by the lvmd client.

use thiserror::Error;

/// Failure talking to an lvmd daemon.
#[derive(Debug, Error)]
pub enum LvmdError {
    /// The daemon address could not be turned into a dialable endpoint.
    #[error("invalid lvmd address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: tonic::transport::Error,
    },

    /// `ListLV` returned no volume for the requested name.
    #[error("logical volume {volume_group}/{name} does not exist")]
    NotFound { volume_group: String, name: String },

    /// The RPC itself failed (transport or daemon-side error).
    #[error("lvmd {method} failed: {status}")]
    Rpc {
        method: &'static str,
        status: tonic::Status,
    },
}

impl LvmdError {
    pub fn rpc(method: &'static str, status: tonic::Status) -> Self {
        Self::Rpc { method, status }
    }

    /// `true` when the logical volume is absent, as opposed to the call failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
