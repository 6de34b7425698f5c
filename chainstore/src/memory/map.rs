//! Thread-safe access to a memory-mapped file.
//!
//! The map tracks two sizes. The *logical* size is the number of bytes the
//! caller has allocated; the *capacity* is the mapped (and file-backed)
//! length, page aligned and grown ahead of demand so that most allocations
//! do not touch the file at all. When an allocation would exceed capacity,
//! the backing file is extended and remapped under an exclusive lock that
//! waits for every outstanding [`Access`] to drop.
//!
//! The first fatal fault is latched and reported forever; the disk-full
//! condition is latched separately and may be cleared with `reset_full` once
//! the operator has made space.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use memmap2::MmapRaw;
use parking_lot::{Mutex, RwLock};
use pow2::Pow2;
use static_assertions::const_assert_eq;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::access::Access;

/// Capacity growth is rounded up to this page size.
const PAGE_SIZE: Pow2 = Pow2::from_exponent(12);
const_assert_eq!(1usize << PAGE_SIZE.exponent(), 4096);

/// The mapping itself, replaced wholesale on remap.
///
/// Readers hold the enclosing lock shared for the lifetime of an [`Access`];
/// the grow path takes it exclusive, so a remap can never move memory out
/// from under a live accessor.
pub(crate) struct Region {
    pub(crate) map: Option<MmapRaw>,
}

/// Size and descriptor state, guarded separately from the mapping so that
/// bookkeeping reads never contend with remap.
struct Fields {
    file: Option<File>,
    loaded: bool,
    logical: usize,
    capacity: usize,
}

/// A memory-mapped table file (head or body).
///
/// Lifecycle: `closed → open → loaded → open → closed`. `load` requires an
/// open file, `flush` a loaded map, `close` an unloaded one. `unload` is
/// idempotent and truncates the backing file to the logical size.
pub struct MemoryMap {
    path: PathBuf,
    minimum: usize,
    expansion: usize,
    region: RwLock<Region>,
    fields: RwLock<Fields>,
    full: AtomicBool,
    fault: Mutex<Option<Error>>,
}

impl MemoryMap {
    /// Binds a map to its backing file without touching the filesystem.
    ///
    /// `minimum` is the smallest capacity ever mapped; `expansion` is the
    /// percentage of headroom added when the file grows.
    pub fn new(path: PathBuf, minimum: usize, expansion: usize) -> Self {
        Self {
            path,
            minimum: minimum.max(1),
            expansion,
            region: RwLock::new(Region { map: None }),
            fields: RwLock::new(Fields {
                file: None,
                loaded: false,
                logical: 0,
                capacity: 0,
            }),
            full: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }

    /// The path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the backing file is open.
    pub fn is_open(&self) -> bool {
        self.fields.read().file.is_some()
    }

    /// True if the file is mapped.
    pub fn is_loaded(&self) -> bool {
        self.fields.read().loaded
    }

    /// The current logical size (zero when closed).
    pub fn size(&self) -> usize {
        self.fields.read().logical
    }

    /// The mapped capacity (zero when unloaded).
    pub fn capacity(&self) -> usize {
        self.fields.read().capacity
    }

    /// Opens (creating if necessary) the backing file.
    pub fn open(&self) -> Result<()> {
        let mut fields = self.fields.write();
        if fields.file.is_some() {
            return Err(Error::OpenOpen);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|_| self.latch(Error::OpenFailure))?;

        let size = file
            .metadata()
            .map_err(|_| self.latch(Error::SizeFailure))?
            .len();

        fields.logical = size as usize;
        fields.file = Some(file);
        Ok(())
    }

    /// Maps the file, extending it to the computed capacity.
    pub fn load(&self) -> Result<()> {
        let mut fields = self.fields.write();
        if fields.loaded {
            return Err(Error::LoadLoaded);
        }
        let Some(file) = fields.file.as_ref() else {
            return Err(Error::UnknownState);
        };

        let capacity = self.to_capacity(fields.logical);
        file.set_len(capacity as u64)
            .map_err(|_| self.latch(Error::FtruncateFailure))?;
        let map = MmapRaw::map_raw(file).map_err(|_| self.latch(Error::MmapFailure))?;

        self.region.write().map = Some(map);
        fields.capacity = capacity;
        fields.loaded = true;
        Ok(())
    }

    /// Synchronizes the mapped range to disk.
    pub fn flush(&self) -> Result<()> {
        let fields = self.fields.read();
        if !fields.loaded {
            return Err(Error::FlushUnloaded);
        }
        drop(fields);

        let region = self.region.read();
        match region.map.as_ref() {
            Some(map) => map.flush().map_err(|_| self.latch(Error::FsyncFailure)),
            None => Err(Error::FlushUnloaded),
        }
    }

    /// Flushes, unmaps, and truncates the file to the logical size.
    ///
    /// Idempotent; a map that is not loaded unloads trivially.
    pub fn unload(&self) -> Result<()> {
        let mut fields = self.fields.write();
        if !fields.loaded {
            return Ok(());
        }

        let mut region = self.region.write();
        if let Some(map) = region.map.as_ref() {
            map.flush().map_err(|_| self.latch(Error::FsyncFailure))?;
        }
        region.map = None;
        drop(region);

        let Some(file) = fields.file.as_ref() else {
            return Err(Error::UnknownState);
        };
        file.set_len(fields.logical as u64)
            .map_err(|_| self.latch(Error::FtruncateFailure))?;
        file.sync_all()
            .map_err(|_| self.latch(Error::FsyncFailure))?;

        fields.capacity = 0;
        fields.loaded = false;
        Ok(())
    }

    /// Closes the backing file; the map must be unloaded. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut fields = self.fields.write();
        if fields.loaded {
            return Err(Error::CloseLoaded);
        }
        fields.file = None;
        Ok(())
    }

    /// Extends the logical size by `chunk` bytes and returns the offset of
    /// the first allocated byte, growing and remapping the file if the
    /// capacity is exceeded.
    ///
    /// `None` on overflow, fault, or disk-full; the logical size is then
    /// unchanged and any fault is latched.
    pub fn allocate(&self, chunk: usize) -> Option<usize> {
        if self.full.load(Ordering::Acquire) || self.fault.lock().is_some() {
            return None;
        }

        let mut fields = self.fields.write();
        if !fields.loaded {
            return None;
        }

        let position = fields.logical;
        let required = position.checked_add(chunk)?;

        if required > fields.capacity {
            let capacity = self.to_capacity(required);
            let Some(file) = fields.file.as_ref() else {
                return None;
            };

            // Exclusive remap: waits for all outstanding accessors.
            let mut region = self.region.write();

            if let Err(error) = file.set_len(capacity as u64) {
                if error.raw_os_error() == Some(libc::ENOSPC) {
                    warn!(path = %self.path.display(), "volume is out of space");
                    self.full.store(true, Ordering::Release);
                } else {
                    self.latch(Error::FtruncateFailure);
                }
                return None;
            }

            // The old mapping is dropped before the file is remapped; the
            // bytes live in the shared file pages throughout.
            region.map = None;
            match MmapRaw::map_raw(file) {
                Ok(map) => region.map = Some(map),
                Err(_) => {
                    self.latch(Error::MmapFailure);
                    return None;
                }
            }

            debug!(
                path = %self.path.display(),
                capacity,
                "memory map expanded"
            );
            fields.capacity = capacity;
        }

        fields.logical = required;
        Some(position)
    }

    /// Shared-locked window over `[offset, logical)`.
    ///
    /// `None` when the map is not loaded or `offset` exceeds the logical
    /// size. The window blocks remap until dropped.
    pub fn get(&self, offset: usize) -> Option<Access<'_>> {
        let fields = self.fields.read();
        if !fields.loaded {
            return None;
        }
        let logical = fields.logical;
        drop(fields);

        if offset > logical {
            return None;
        }

        let region = self.region.read();
        let base = region.map.as_ref()?.as_mut_ptr();
        // Safety: offset <= logical <= capacity = mapping length.
        let begin = unsafe { base.add(offset) };
        Some(Access::new(region, begin, logical - offset))
    }

    /// Extends the logical size to at least `size`; false on allocation
    /// failure.
    pub fn expand(&self, size: usize) -> bool {
        let shortfall = size.saturating_sub(self.size());
        shortfall == 0 || self.allocate(shortfall).is_some()
    }

    /// Reduces the logical size; false if `size` exceeds it.
    pub fn truncate(&self, size: usize) -> bool {
        let mut fields = self.fields.write();
        if size > fields.logical {
            return false;
        }
        fields.logical = size;
        true
    }

    /// The first latched fatal fault, if any.
    pub fn get_fault(&self) -> Option<Error> {
        self.fault.lock().clone()
    }

    /// True while the disk-full condition is latched.
    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    /// Clears the disk-full condition once space has been made available.
    pub fn reset_full(&self) {
        self.full.store(false, Ordering::Release);
    }

    /// Growth policy: at least `minimum`, otherwise `required` plus the
    /// configured expansion percentage, page aligned.
    fn to_capacity(&self, required: usize) -> usize {
        if required <= self.minimum {
            return self.minimum;
        }
        let headroom = (required / 100).saturating_mul(self.expansion);
        let expanded = required.saturating_add(headroom);
        let page = usize::from(PAGE_SIZE);
        expanded.saturating_add(page - 1) / page * page
    }

    /// Latches the disk-full condition, as an allocation hitting ENOSPC
    /// would.
    #[cfg(test)]
    pub(crate) fn force_full(&self) {
        self.full.store(true, Ordering::Release);
    }

    /// Latches the first fatal fault and returns the code for propagation.
    fn latch(&self, error: Error) -> Error {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            warn!(path = %self.path.display(), %error, "fault latched");
            *fault = Some(error.clone());
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_at(root: &Path, minimum: usize) -> MemoryMap {
        MemoryMap::new(root.join("table.data"), minimum, 50)
    }

    #[test]
    fn lifecycle_state_machine() {
        let root = tempfile::tempdir().unwrap();
        let map = map_at(root.path(), 1);

        assert!(!map.is_open());
        map.open().unwrap();
        assert!(map.is_open());
        assert_eq!(map.open(), Err(Error::OpenOpen));

        map.load().unwrap();
        assert!(map.is_loaded());
        assert_eq!(map.load(), Err(Error::LoadLoaded));
        assert_eq!(map.close(), Err(Error::CloseLoaded));

        map.flush().unwrap();
        map.unload().unwrap();
        map.unload().unwrap();
        assert_eq!(map.flush(), Err(Error::FlushUnloaded));
        map.close().unwrap();
        map.close().unwrap();
    }

    #[test]
    fn allocate_returns_sequential_offsets() {
        let root = tempfile::tempdir().unwrap();
        let map = map_at(root.path(), 64);
        map.open().unwrap();
        map.load().unwrap();

        assert_eq!(map.allocate(16), Some(0));
        assert_eq!(map.allocate(16), Some(16));
        assert_eq!(map.size(), 32);
        assert!(map.capacity() >= 64);
    }

    #[test]
    fn growth_remaps_and_preserves_contents() {
        let root = tempfile::tempdir().unwrap();
        let map = map_at(root.path(), 64);
        map.open().unwrap();
        map.load().unwrap();

        let offset = map.allocate(64).unwrap();
        map.get(offset).unwrap().write(0, &[0xabu8; 64]);

        // Exceeds the 64-byte minimum capacity and forces a remap.
        let more = map.allocate(4096).unwrap();
        assert_eq!(more, 64);
        assert!(map.capacity() >= 64 + 4096);

        let access = map.get(0).unwrap();
        assert_eq!(access.read(0, 64).unwrap(), &[0xabu8; 64]);
    }

    #[test]
    fn logical_survives_unload_and_reload() {
        let root = tempfile::tempdir().unwrap();
        let map = map_at(root.path(), 64);
        map.open().unwrap();
        map.load().unwrap();
        map.allocate(24).unwrap();
        map.get(0).unwrap().write(0, b"twenty-four bytes padded");
        map.unload().unwrap();
        map.close().unwrap();

        assert_eq!(crate::file::size(map.path()), Some(24));

        map.open().unwrap();
        map.load().unwrap();
        assert_eq!(map.size(), 24);
        let access = map.get(0).unwrap();
        assert_eq!(access.read(0, 24).unwrap(), b"twenty-four bytes padded");
    }

    #[test]
    fn expand_only_grows() {
        let root = tempfile::tempdir().unwrap();
        let map = map_at(root.path(), 64);
        map.open().unwrap();
        map.load().unwrap();

        assert!(map.expand(48));
        assert_eq!(map.size(), 48);
        assert!(map.expand(16), "expand never shrinks");
        assert_eq!(map.size(), 48);
    }

    #[test]
    fn truncate_only_shrinks() {
        let root = tempfile::tempdir().unwrap();
        let map = map_at(root.path(), 64);
        map.open().unwrap();
        map.load().unwrap();
        map.allocate(32).unwrap();

        assert!(!map.truncate(33));
        assert_eq!(map.size(), 32);
        assert!(map.truncate(32), "truncate to logical is a no-op");
        assert!(map.truncate(8));
        assert_eq!(map.size(), 8);
    }

    #[test]
    fn get_bounds() {
        let root = tempfile::tempdir().unwrap();
        let map = map_at(root.path(), 64);
        map.open().unwrap();
        map.load().unwrap();
        map.allocate(16).unwrap();

        assert!(map.get(17).is_none());
        assert_eq!(map.get(16).unwrap().size(), 0);
        assert_eq!(map.get(4).unwrap().size(), 12);
    }

    #[test]
    fn full_flag_resets() {
        let root = tempfile::tempdir().unwrap();
        let map = map_at(root.path(), 64);
        assert!(!map.is_full());
        map.reset_full();
        assert!(!map.is_full());
        assert_eq!(map.get_fault(), None);
    }
}
