// On-disk cyclic segment ring shared by the fetcher (writer) and director (reader).
//
// Each slot is one staged file guarded by its own lock. The ring never blocks
// on "full": the fetcher may overwrite a slot the director has not played yet.

use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::hls::HlsPipeError;
use crate::hls::config::HlsPipeConfig;

struct Slot {
    path: PathBuf,
    lock: Mutex<()>,
}

pub struct SegmentRing {
    slots: Vec<Slot>,
}

/// Exclusive access to one slot file for the lifetime of the guard.
pub struct SlotGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    index: usize,
    path: &'a Path,
}

impl SlotGuard<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    /// Replace the slot file with a copy of `source`.
    pub async fn copy_from(&self, source: &Path) -> std::io::Result<u64> {
        let copied = tokio::fs::copy(source, self.path).await?;
        debug!(slot = self.index, bytes = copied, "Stored segment in ring slot");
        Ok(copied)
    }
}

impl SegmentRing {
    pub fn new(config: &HlsPipeConfig) -> Self {
        let slots = (0..config.ring_config.slot_count)
            .map(|i| Slot {
                path: config.slot_path(i),
                lock: Mutex::new(()),
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot_path(&self, index: usize) -> Option<&Path> {
        self.slots.get(index).map(|slot| slot.path.as_path())
    }

    /// Waits for the slot lock. `index` is reduced modulo the ring size.
    pub async fn lock(&self, index: usize) -> SlotGuard<'_> {
        let index = index % self.slots.len();
        let slot = &self.slots[index];
        SlotGuard {
            _guard: slot.lock.lock().await,
            index,
            path: &slot.path,
        }
    }

    /// Copy `source` into one slot while holding its lock. The token is
    /// checked once the lock is held, so a stopped run never writes.
    pub async fn store(
        &self,
        index: usize,
        source: &Path,
        token: &CancellationToken,
    ) -> Result<u64, HlsPipeError> {
        let guard = self.lock(index).await;
        if token.is_cancelled() {
            return Err(HlsPipeError::Cancelled);
        }
        Ok(guard.copy_from(source).await?)
    }

    /// Copy `source` into every slot, one lock at a time.
    pub async fn fill(&self, source: &Path, token: &CancellationToken) -> Result<(), HlsPipeError> {
        for index in 0..self.slots.len() {
            self.store(index, source, token).await?;
        }
        Ok(())
    }
}

/// Circular successor of `cursor` in a ring of `len` slots.
pub fn next_index(cursor: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (cursor + 1) % len
}

/// Remove every staged segment file (`*.<ext>`) in the staging directory,
/// creating the directory if it does not exist yet.
pub async fn purge_staged_files(config: &HlsPipeConfig) -> std::io::Result<usize> {
    tokio::fs::create_dir_all(&config.staging_dir).await?;
    let mut removed = 0;
    let mut entries = tokio::fs::read_dir(&config.staging_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && config.is_staged_file(&path) {
            tokio::fs::remove_file(&path).await?;
            removed += 1;
        }
    }
    Ok(removed)
}
