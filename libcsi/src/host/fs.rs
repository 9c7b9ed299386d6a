//! Filesystem detection and formatting through external tools.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::CsiError;

/// Filesystem inspection and creation on a block device.
#[async_trait]
pub trait FilesystemTool: Send + Sync {
    /// Filesystem type on `device`, or an empty string when the device holds
    /// no recognizable data.
    async fn detect_filesystem_type(&self, device: &Path) -> Result<String, CsiError>;

    async fn format_device(&self, device: &Path, fs_type: &str) -> Result<(), CsiError>;
}

/// [`FilesystemTool`] built on `file`, `blkid` and `mkfs`.
///
/// `file` decides whether anything is on the device at all; `blkid` then names
/// it.  `lsblk` is avoided because it depends on udev being up to date, which
/// it often is not right after a device was wiped.
#[derive(Debug, Clone)]
pub struct ShellFilesystemTool {
    file: PathBuf,
    blkid: PathBuf,
    mkfs: PathBuf,
}

impl Default for ShellFilesystemTool {
    fn default() -> Self {
        Self {
            file: "file".into(),
            blkid: "blkid".into(),
            mkfs: "mkfs".into(),
        }
    }
}

impl ShellFilesystemTool {
    /// Use explicit paths for the three tools.
    pub fn with_commands(
        file: impl Into<PathBuf>,
        blkid: impl Into<PathBuf>,
        mkfs: impl Into<PathBuf>,
    ) -> Self {
        Self {
            file: file.into(),
            blkid: blkid.into(),
            mkfs: mkfs.into(),
        }
    }
}

#[async_trait]
impl FilesystemTool for ShellFilesystemTool {
    #[instrument(skip(self))]
    async fn detect_filesystem_type(&self, device: &Path) -> Result<String, CsiError> {
        let signature = run(&self.file, &["-bsL".as_ref(), device.as_os_str()])
            .await?
            .map_err(|output| {
                CsiError::Internal(format!("file {} failed: {output}", device.display()))
            })?;
        if is_unformatted(&signature) {
            debug!("no filesystem signature");
            return Ok(String::new());
        }

        let export = run(
            &self.blkid,
            &[
                "-c".as_ref(),
                "/dev/null".as_ref(),
                "-o".as_ref(),
                "export".as_ref(),
                device.as_os_str(),
            ],
        )
        .await?
        .map_err(|output| {
            CsiError::Internal(format!("blkid {} failed: {output}", device.display()))
        })?;

        parse_blkid_export(&export).ok_or_else(|| {
            CsiError::Internal(format!(
                "cannot parse blkid output for {}: {export:?}",
                device.display()
            ))
        })
    }

    #[instrument(skip(self))]
    async fn format_device(&self, device: &Path, fs_type: &str) -> Result<(), CsiError> {
        run(&self.mkfs, &["-t".as_ref(), fs_type.as_ref(), device.as_os_str()])
            .await?
            .map_err(|output| CsiError::FormatFailed {
                device: device.display().to_string(),
                fs_type: fs_type.to_owned(),
                output,
            })?;
        debug!("device formatted");
        Ok(())
    }
}

/// `file -bsL` prints exactly `data` for content it cannot identify.
pub fn is_unformatted(signature: &str) -> bool {
    signature.trim() == "data"
}

/// Extract `TYPE` from `blkid -o export` output.
///
/// Returns `None` when there is no `TYPE` key or a non-empty line is not a
/// `KEY=value` pair.
pub fn parse_blkid_export(output: &str) -> Option<String> {
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (key, value) = line.split_once('=')?;
        if key == "TYPE" {
            return Some(value.to_owned());
        }
    }
    None
}

/// Run `program` and return its combined output, `Err(output)` on non-zero
/// exit.  Failing to spawn at all is an internal error.
async fn run(
    program: &Path,
    args: &[&std::ffi::OsStr],
) -> Result<Result<String, String>, CsiError> {
    let out = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| CsiError::Internal(format!("spawn {}: {e}", program.display())))?;

    let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&out.stderr));

    if out.status.success() {
        Ok(Ok(combined))
    } else {
        Ok(Err(combined))
    }
}
