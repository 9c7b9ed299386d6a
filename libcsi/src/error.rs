//! CSI error types.
//!
//! All errors surfaced by CSI operations are represented by the [`CsiError`]
//! enum, which derives [`thiserror::Error`] and also implements
//! [`Serialize`]/[`Deserialize`] so errors can travel across the QUIC
//! transport layer.  [`CsiError::code`] maps each variant onto the status
//! code the orchestrator sees.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status classes reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// Malformed request, or a caller-supplied id that does not resolve.
    InvalidArgument,
    /// The named object does not exist.
    NotFound,
    /// The system is not in the state the operation requires.
    FailedPrecondition,
    /// Anything that went wrong inside the plugin or its dependencies.
    Internal,
}

/// Unified error type for CSI operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone)]
pub enum CsiError {
    /// The caller supplied an invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested object was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The target path exists but nothing is mounted there.
    #[error("volume not mounted at {0}")]
    NotMounted(String),

    /// A mount operation failed.
    #[error("mount failed at {path}: {reason}")]
    MountFailed {
        /// Filesystem path where the mount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An unmount operation failed.
    #[error("unmount failed at {path}: {reason}")]
    UnmountFailed {
        /// Filesystem path where the unmount was attempted.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// `mkfs` exited non-zero.
    #[error("formatting {device} as {fs_type} failed: {output}")]
    FormatFailed {
        device: String,
        fs_type: String,
        /// Captured command output.
        output: String,
    },

    /// The lvmd daemon could not be reached or rejected a call.
    #[error("lvmd error: {0}")]
    DaemonError(String),

    /// The cluster metadata store returned an error.
    #[error("metadata error: {0}")]
    MetadataError(String),

    /// A QUIC / transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// An unclassified internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CsiError {
    /// Create a [`CsiError::DaemonError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn daemon<E: std::fmt::Display>(e: E) -> Self {
        Self::DaemonError(e.to_string())
    }

    /// Create a [`CsiError::MetadataError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn metadata<E: std::fmt::Display>(e: E) -> Self {
        Self::MetadataError(e.to_string())
    }

    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// Status class of this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::NotMounted(_) => StatusCode::FailedPrecondition,
            Self::MountFailed { .. }
            | Self::UnmountFailed { .. }
            | Self::FormatFailed { .. }
            | Self::DaemonError(_)
            | Self::MetadataError(_)
            | Self::TransportError(_)
            | Self::Internal(_) => StatusCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CsiError::NotFound("target path /mnt/x".into());
        assert_eq!(err.to_string(), "target path /mnt/x not found");
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            CsiError::InvalidArgument("x".into()).code(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            CsiError::NotMounted("/mnt".into()).code(),
            StatusCode::FailedPrecondition
        );
        assert_eq!(CsiError::daemon("refused").code(), StatusCode::Internal);
        let err = CsiError::FormatFailed {
            device: "/dev/lvmvg/v".into(),
            fs_type: "ext4".into(),
            output: "mke2fs: No such file".into(),
        };
        assert_eq!(err.code(), StatusCode::Internal);
    }

    #[test]
    fn error_serde_roundtrip() {
        let err = CsiError::MountFailed {
            path: "/mnt/test".into(),
            reason: "permission denied".into(),
        };
        let json = serde_json::to_string(&err).expect("serialize");
        let de: CsiError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err.to_string(), de.to_string());
    }
}
