//! Per-volume mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async locks keyed by volume id.  Entries are dropped once no task holds or
/// waits on them.
#[derive(Default)]
pub(crate) struct VolumeLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl VolumeLocks {
    pub(crate) async fn lock(&self, volume_id: &str) -> VolumeGuard<'_> {
        let mutex = Arc::clone(&self.inner.entry(volume_id.to_owned()).or_default());
        let guard = mutex.lock_owned().await;
        VolumeGuard {
            locks: self,
            volume_id: volume_id.to_owned(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

pub(crate) struct VolumeGuard<'a> {
    locks: &'a VolumeLocks,
    volume_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for VolumeGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or awaits the lock.
        self.locks
            .inner
            .remove_if(&self.volume_id, |_, m| Arc::strong_count(m) == 1);
    }
}
