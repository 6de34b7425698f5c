//! Scoped, remap-blocking windows over mapped memory.

use parking_lot::RwLockReadGuard;

use crate::memory::map::Region;

/// A bounded byte window into a mapped file.
///
/// The window holds the map's remap lock shared for its lifetime, so the
/// mapping cannot move while it is alive. Dropping the access releases the
/// lock. Holding an access (or an iterator, which contains one) across a
/// write to the same table can deadlock: a write that must grow the file
/// waits for every outstanding access to drop.
///
/// All offsets are relative to the window start. Reads are bounds-checked
/// and return `None` out of range.
pub struct Access<'a> {
    _guard: RwLockReadGuard<'a, Region>,
    begin: *mut u8,
    size: usize,
}

impl<'a> Access<'a> {
    pub(crate) fn new(guard: RwLockReadGuard<'a, Region>, begin: *mut u8, size: usize) -> Self {
        Self {
            _guard: guard,
            begin,
            size,
        }
    }

    /// The window length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Borrows `len` bytes at window offset `at`.
    pub fn read(&self, at: usize, len: usize) -> Option<&[u8]> {
        let end = at.checked_add(len)?;
        if end > self.size {
            return None;
        }
        // Safety: in bounds of the mapped window, which cannot be remapped
        // while the guard is held. Published element bytes are never
        // rewritten; unpublished bytes are written only by the single owner
        // of their allocation.
        Some(unsafe { std::slice::from_raw_parts(self.begin.add(at), len) })
    }

    /// Copies a fixed-size array out of the window.
    pub fn read_array<const N: usize>(&self, at: usize) -> Option<[u8; N]> {
        let bytes = self.read(at, N)?;
        let mut array = [0u8; N];
        array.copy_from_slice(bytes);
        Some(array)
    }

    /// Writes bytes into the window; false out of bounds.
    ///
    /// Callers own the target range exclusively: either freshly allocated,
    /// still-unpublished element bytes, or a head slot under the head's
    /// exclusive mutex.
    pub(crate) fn write(&self, at: usize, bytes: &[u8]) -> bool {
        let Some(end) = at.checked_add(bytes.len()) else {
            return false;
        };
        if end > self.size {
            return false;
        }
        // Safety: in bounds; exclusivity of the target range per above.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.begin.add(at), bytes.len());
        }
        true
    }

    /// Fills a range of the window with one byte value; false out of bounds.
    pub(crate) fn fill(&self, at: usize, len: usize, value: u8) -> bool {
        let Some(end) = at.checked_add(len) else {
            return false;
        };
        if end > self.size {
            return false;
        }
        // Safety: as for `write`.
        unsafe {
            std::ptr::write_bytes(self.begin.add(at), value, len);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::map::MemoryMap;

    #[test]
    fn reads_and_writes_are_bounds_checked() {
        let root = tempfile::tempdir().unwrap();
        let map = MemoryMap::new(root.path().join("access.data"), 64, 0);
        map.open().unwrap();
        map.load().unwrap();
        map.allocate(8).unwrap();

        let access = map.get(0).unwrap();
        assert_eq!(access.size(), 8);

        assert!(access.write(0, &[1, 2, 3, 4]));
        assert!(access.write(4, &[5, 6, 7, 8]));
        assert!(!access.write(5, &[0; 4]), "write past the window fails");

        assert_eq!(access.read(0, 8).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(access.read_array::<2>(3), Some([4, 5]));
        assert!(access.read(7, 2).is_none());
        assert!(access.read_array::<9>(0).is_none());

        assert!(access.fill(2, 4, 0xff));
        assert_eq!(access.read(0, 8).unwrap(), &[1, 2, 0xff, 0xff, 0xff, 0xff, 7, 8]);
    }

    #[test]
    fn window_offsets_are_relative() {
        let root = tempfile::tempdir().unwrap();
        let map = MemoryMap::new(root.path().join("window.data"), 64, 0);
        map.open().unwrap();
        map.load().unwrap();
        map.allocate(16).unwrap();
        map.get(0).unwrap().write(12, &[9, 9, 9, 9]);

        let window = map.get(12).unwrap();
        assert_eq!(window.size(), 4);
        assert_eq!(window.read(0, 4).unwrap(), &[9, 9, 9, 9]);
    }
}
