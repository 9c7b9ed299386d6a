//! Host-side helpers used by the Node service: filesystem detection and
//! formatting, and mount handling.  Both are traits so the publish workflow
//! can run against fakes.

mod fs;
mod mount;

pub use fs::{FilesystemTool, ShellFilesystemTool, is_unformatted, parse_blkid_export};
pub use mount::{Mounter, SystemMounter};
