//! In-memory fakes for the cluster, the lvmd daemons and the host.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use liblvmd::{LogicalVolume, LvmConnection, LvmConnector, LvmOptions, LvmdError, Status};

use super::{LvmDriver, LvmDriverConfig};
use crate::error::CsiError;
use crate::host::{FilesystemTool, Mounter};
use crate::metadata::{
    ClusterMetadata, HOSTNAME_LABEL_KEY, MetadataError, NODE_ANNOTATION_KEY, Node, NodeAddress,
    NodeStatus, ObjectMeta, PersistentVolume, PersistentVolumeSpec, STORAGE_RESOURCE,
};

pub(super) const NODE: &str = "node-1";
pub(super) const NODE_IP: &str = "10.0.0.5";

#[derive(Debug, Clone, PartialEq)]
pub(super) struct FakeMount {
    pub source: PathBuf,
    pub fs_type: String,
    pub options: Vec<String>,
}

/// Everything the fakes observe or mutate.
#[derive(Default)]
pub(super) struct FakeHost {
    pub devices: HashSet<PathBuf>,
    pub dirs: HashSet<PathBuf>,
    pub mounts: HashMap<PathBuf, FakeMount>,
    pub filesystems: HashMap<PathBuf, String>,
    pub formats: Vec<(PathBuf, String)>,
    pub detects: usize,
    pub lvs: HashMap<(String, String), u64>,
    pub creates: Vec<LvmOptions>,
    pub removes: Vec<(String, String)>,
    pub connects: Vec<String>,
    pub fail_create: bool,
    pub fail_get: bool,
    pub fail_remove: bool,
    pub fail_format: bool,
    pub fail_mount: bool,
    pub fail_unmount: bool,
}

impl FakeHost {
    pub fn add_lv(&mut self, volume_group: &str, name: &str) {
        self.lvs
            .insert((volume_group.to_owned(), name.to_owned()), 1 << 20);
    }
}

type Shared = Arc<Mutex<FakeHost>>;

fn lock(state: &Shared) -> MutexGuard<'_, FakeHost> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Cluster metadata
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(super) struct FakeMetadata {
    volumes: Mutex<HashMap<String, PersistentVolume>>,
    nodes: Mutex<HashMap<String, Node>>,
    updates: Mutex<usize>,
    /// Reads of volume records fail with a 503.
    pub volume_outage: AtomicBool,
    /// Updates of volume records fail with a 503.
    pub update_outage: AtomicBool,
}

fn unavailable(kind: &'static str, name: &str) -> MetadataError {
    MetadataError::Status {
        kind,
        name: name.to_owned(),
        status: 503,
        message: "etcd unavailable".into(),
    }
}

impl FakeMetadata {
    pub fn put_volume(&self, volume: PersistentVolume) {
        self.volumes
            .lock()
            .unwrap()
            .insert(volume.metadata.name.clone(), volume);
    }

    pub fn put_node(&self, node: Node) {
        self.nodes
            .lock()
            .unwrap()
            .insert(node.metadata.name.clone(), node);
    }

    pub fn volume(&self, name: &str) -> PersistentVolume {
        self.volumes.lock().unwrap()[name].clone()
    }

    pub fn updates(&self) -> usize {
        *self.updates.lock().unwrap()
    }
}

#[async_trait]
impl ClusterMetadata for FakeMetadata {
    async fn get_volume(&self, volume_id: &str) -> Result<PersistentVolume, MetadataError> {
        if self.volume_outage.load(Ordering::SeqCst) {
            return Err(unavailable("volume", volume_id));
        }
        self.volumes
            .lock()
            .unwrap()
            .get(volume_id)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound {
                kind: "volume",
                name: volume_id.to_owned(),
            })
    }

    async fn update_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<PersistentVolume, MetadataError> {
        if self.update_outage.load(Ordering::SeqCst) {
            return Err(unavailable("volume", volume.name()));
        }
        *self.updates.lock().unwrap() += 1;
        self.put_volume(volume.clone());
        Ok(volume.clone())
    }

    async fn get_node(&self, node_name: &str) -> Result<Node, MetadataError> {
        self.nodes
            .lock()
            .unwrap()
            .get(node_name)
            .cloned()
            .ok_or_else(|| MetadataError::NotFound {
                kind: "node",
                name: node_name.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// lvmd
// ---------------------------------------------------------------------------

struct FakeConnector(Shared);

#[async_trait]
impl LvmConnector for FakeConnector {
    async fn connect(&self, address: &str) -> Result<Box<dyn LvmConnection>, LvmdError> {
        lock(&self.0).connects.push(address.to_owned());
        Ok(Box::new(FakeConnection(Arc::clone(&self.0))))
    }
}

struct FakeConnection(Shared);

#[async_trait]
impl LvmConnection for FakeConnection {
    async fn create_lv(&self, opts: &LvmOptions) -> Result<String, LvmdError> {
        // Give concurrent publishers a chance to interleave.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut host = lock(&self.0);
        host.creates.push(opts.clone());
        if host.fail_create {
            return Err(LvmdError::rpc(
                "CreateLV",
                Status::internal("volume group is full"),
            ));
        }
        host.lvs
            .insert((opts.volume_group.clone(), opts.name.clone()), opts.size);
        host.devices
            .insert(Path::new("/dev").join(&opts.volume_group).join(&opts.name));
        Ok(String::new())
    }

    async fn get_lv(&self, volume_group: &str, name: &str) -> Result<LogicalVolume, LvmdError> {
        let host = lock(&self.0);
        if host.fail_get {
            return Err(LvmdError::rpc("ListLV", Status::unavailable("lvmd restarting")));
        }
        host.lvs
            .get(&(volume_group.to_owned(), name.to_owned()))
            .map(|size| LogicalVolume {
                name: name.to_owned(),
                size: *size,
                uuid: String::new(),
            })
            .ok_or_else(|| LvmdError::NotFound {
                volume_group: volume_group.to_owned(),
                name: name.to_owned(),
            })
    }

    async fn remove_lv(&self, volume_group: &str, name: &str) -> Result<(), LvmdError> {
        let mut host = lock(&self.0);
        if host.fail_remove {
            return Err(LvmdError::rpc("RemoveLV", Status::internal("device busy")));
        }
        host.removes.push((volume_group.to_owned(), name.to_owned()));
        host.lvs.remove(&(volume_group.to_owned(), name.to_owned()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

struct FakeMounter(Shared);

#[async_trait]
impl Mounter for FakeMounter {
    async fn path_exists(&self, path: &Path) -> io::Result<bool> {
        Ok(lock(&self.0).devices.contains(path))
    }

    async fn is_likely_not_mount_point(&self, path: &Path) -> io::Result<bool> {
        let host = lock(&self.0);
        if !host.dirs.contains(path) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(!host.mounts.contains_key(path))
    }

    async fn make_dir(&self, path: &Path) -> io::Result<()> {
        lock(&self.0).dirs.insert(path.to_owned());
        Ok(())
    }

    async fn mount(
        &self,
        source: &Path,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), CsiError> {
        let mut host = lock(&self.0);
        if host.fail_mount {
            return Err(CsiError::MountFailed {
                path: target.display().to_string(),
                reason: "wrong fs type".into(),
            });
        }
        host.mounts.insert(
            target.to_owned(),
            FakeMount {
                source: source.to_owned(),
                fs_type: fs_type.to_owned(),
                options: options.to_vec(),
            },
        );
        Ok(())
    }

    async fn unmount_path(&self, target: &Path) -> Result<(), CsiError> {
        let mut host = lock(&self.0);
        if host.fail_unmount {
            return Err(CsiError::UnmountFailed {
                path: target.display().to_string(),
                reason: "device or resource busy".into(),
            });
        }
        host.mounts.remove(target);
        host.dirs.remove(target);
        Ok(())
    }
}

struct FakeFs(Shared);

#[async_trait]
impl FilesystemTool for FakeFs {
    async fn detect_filesystem_type(&self, device: &Path) -> Result<String, CsiError> {
        let mut host = lock(&self.0);
        host.detects += 1;
        Ok(host.filesystems.get(device).cloned().unwrap_or_default())
    }

    async fn format_device(&self, device: &Path, fs_type: &str) -> Result<(), CsiError> {
        let mut host = lock(&self.0);
        host.formats.push((device.to_owned(), fs_type.to_owned()));
        if host.fail_format {
            return Err(CsiError::FormatFailed {
                device: device.display().to_string(),
                fs_type: fs_type.to_owned(),
                output: "mkfs: bad superblock".into(),
            });
        }
        host.filesystems.insert(device.to_owned(), fs_type.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Volume record with a storage capacity and no owner.
pub(super) fn pv(name: &str, storage: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: ObjectMeta {
            name: name.to_owned(),
            ..Default::default()
        },
        spec: PersistentVolumeSpec {
            capacity: [(STORAGE_RESOURCE.to_owned(), storage.to_owned())].into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Node record with an optional hostname label and an `InternalIP`.
pub(super) fn node(name: &str, hostname: Option<&str>, ip: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: name.to_owned(),
            labels: hostname
                .map(|h| (HOSTNAME_LABEL_KEY.to_owned(), h.to_owned()))
                .into_iter()
                .collect(),
            ..Default::default()
        },
        status: NodeStatus {
            addresses: vec![NodeAddress {
                kind: "InternalIP".into(),
                address: ip.to_owned(),
            }],
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(super) struct Harness {
    pub driver: Arc<LvmDriver>,
    pub metadata: Arc<FakeMetadata>,
    state: Shared,
}

impl Harness {
    /// Driver for [`NODE`], whose node record is registered at [`NODE_IP`].
    pub fn new() -> Self {
        let state = Shared::default();
        let metadata = Arc::new(FakeMetadata::default());
        metadata.put_node(node(NODE, Some(NODE), NODE_IP));

        let driver = LvmDriver::with_host(
            LvmDriverConfig::new(NODE),
            Arc::clone(&metadata) as Arc<dyn ClusterMetadata>,
            Arc::new(FakeConnector(Arc::clone(&state))),
            Arc::new(FakeMounter(Arc::clone(&state))),
            Arc::new(FakeFs(Arc::clone(&state))),
        );
        Self {
            driver: Arc::new(driver),
            metadata,
            state,
        }
    }

    pub fn host(&self) -> MutexGuard<'_, FakeHost> {
        lock(&self.state)
    }

    /// Volume record already bound to [`NODE`].
    pub fn owned_pv(&self, name: &str, storage: &str) -> PersistentVolume {
        let mut volume = pv(name, storage);
        volume
            .metadata
            .annotations
            .insert(NODE_ANNOTATION_KEY.to_owned(), NODE.to_owned());
        volume
    }
}
