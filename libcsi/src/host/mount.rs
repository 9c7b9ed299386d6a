//! Device presence, mount point probing, mount and unmount.

use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::CsiError;

/// Mode of target directories created before mounting.
const MOUNT_DIR_MODE: u32 = 0o750;

/// Local mount operations.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Whether anything exists at `path` (used for device nodes).
    async fn path_exists(&self, path: &Path) -> io::Result<bool>;

    /// `Ok(true)` when `path` is probably not a mount point.  A missing path
    /// is reported as an [`io::ErrorKind::NotFound`] error.
    async fn is_likely_not_mount_point(&self, path: &Path) -> io::Result<bool>;

    /// Create `path` and its parents.
    async fn make_dir(&self, path: &Path) -> io::Result<()>;

    async fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), CsiError>;

    /// Unmount `target` and remove the emptied directory.
    async fn unmount_path(&self, target: &Path) -> Result<(), CsiError>;
}

/// [`Mounter`] acting on the host through `mount(8)` and `umount(2)`.
#[derive(Debug, Clone)]
pub struct SystemMounter {
    mount: PathBuf,
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self {
            mount: "mount".into(),
        }
    }
}

#[async_trait]
impl Mounter for SystemMounter {
    async fn path_exists(&self, path: &Path) -> io::Result<bool> {
        tokio::fs::try_exists(path).await
    }

    async fn is_likely_not_mount_point(&self, path: &Path) -> io::Result<bool> {
        let stat = tokio::fs::metadata(path).await?;
        // A mount point sits on a different device than its parent.  Bind
        // mounts of the same device are not detected.
        let parent = path.parent().unwrap_or(Path::new("/"));
        let parent_stat = tokio::fs::symlink_metadata(parent).await?;
        Ok(stat.dev() == parent_stat.dev())
    }

    async fn make_dir(&self, path: &Path) -> io::Result<()> {
        tokio::fs::DirBuilder::new()
            .recursive(true)
            .mode(MOUNT_DIR_MODE)
            .create(path)
            .await
    }

    #[instrument(skip(self))]
    async fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), CsiError> {
        let mut cmd = Command::new(&self.mount);
        cmd.arg("-t").arg(fs_type);
        if !options.is_empty() {
            cmd.arg("-o").arg(options.join(","));
        }
        cmd.arg(source).arg(target);

        let out = cmd.output().await.map_err(|e| CsiError::MountFailed {
            path: target.display().to_string(),
            reason: format!("spawn {}: {e}", self.mount.display()),
        })?;
        if !out.status.success() {
            let mut reason = String::from_utf8_lossy(&out.stdout).into_owned();
            reason.push_str(&String::from_utf8_lossy(&out.stderr));
            return Err(CsiError::MountFailed {
                path: target.display().to_string(),
                reason,
            });
        }
        debug!("mounted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unmount_path(&self, target: &Path) -> Result<(), CsiError> {
        // umount(2) can block for as long as the filesystem hangs.
        let owned = target.to_owned();
        tokio::task::spawn_blocking(move || nix::mount::umount(owned.as_path()))
            .await
            .map_err(|e| CsiError::UnmountFailed {
                path: target.display().to_string(),
                reason: format!("unmount task: {e}"),
            })?
            .map_err(|e| CsiError::UnmountFailed {
                path: target.display().to_string(),
                reason: e.to_string(),
            })?;

        match tokio::fs::remove_dir(target).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CsiError::UnmountFailed {
                    path: target.display().to_string(),
                    reason: format!("remove mount point: {e}"),
                });
            }
        }
        debug!("unmounted");
        Ok(())
    }
}
