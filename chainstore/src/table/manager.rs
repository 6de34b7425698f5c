//! Link/offset arithmetic over a body file.

use std::sync::Arc;

use crate::error::Error;
use crate::link::{Link, SLAB};
use crate::memory::access::Access;
use crate::memory::map::MemoryMap;

/// Bytes per element position unit.
///
/// Slab tables address raw bytes (stride 1). Keyed record elements carry a
/// next link and key ahead of the payload; unkeyed (array) records are bare
/// payloads.
pub(crate) const fn stride(link_size: usize, key_size: usize, payload: usize) -> usize {
    if payload == SLAB {
        1
    } else if key_size > 0 {
        link_size + key_size + payload
    } else {
        payload
    }
}

/// Translates links to byte positions for a body of `N`-byte links,
/// `K`-byte keys, and `S`-byte payloads (`S == SLAB` for variable size).
///
/// Stateless beyond the file reference; concurrency is the file's.
pub struct Manager<const N: usize, const K: usize, const S: usize> {
    file: Arc<MemoryMap>,
}

impl<const N: usize, const K: usize, const S: usize> Manager<N, K, S> {
    pub(crate) const IS_SLAB: bool = S == SLAB;
    pub(crate) const STRIDE: usize = stride(N, K, S);
    // Rejects zero-size unkeyed records at compile time.
    const VALID: () = assert!(Self::STRIDE > 0, "element stride must be nonzero");

    /// Manages the given body file.
    pub fn new(file: Arc<MemoryMap>) -> Self {
        let () = Self::VALID;
        Self { file }
    }

    /// The body's logical byte count.
    pub fn size(&self) -> usize {
        self.file.size()
    }

    /// The body's reserved byte count.
    pub fn capacity(&self) -> usize {
        self.file.capacity()
    }

    /// The logical element count (byte count for slabs).
    pub fn count(&self) -> Link<N> {
        Self::position_to_link(self.file.size())
    }

    /// Reduces the logical size to `count` elements; false if it exceeds
    /// the current count.
    pub fn truncate(&self, count: Link<N>) -> bool {
        self.file.truncate(Self::link_to_position(count))
    }

    /// Extends the body by `count` elements (or slab bytes) and returns the
    /// link of the first; terminal on overflow, fault, or disk-full.
    pub fn allocate(&self, count: usize) -> Link<N> {
        let Some(chunk) = count.checked_mul(Self::STRIDE) else {
            return Link::TERMINAL;
        };
        match self.file.allocate(chunk) {
            Some(position) => Self::position_to_link(position),
            None => Link::TERMINAL,
        }
    }

    /// Window positioned at the element; `None` for terminal links or
    /// positions beyond the logical size.
    pub fn get(&self, link: Link<N>) -> Option<Access<'_>> {
        if link.is_terminal() {
            return None;
        }
        self.file.get(Self::link_to_position(link))
    }

    /// Window over the whole body, for chain iteration.
    pub fn body(&self) -> Option<Access<'_>> {
        self.file.get(0)
    }

    /// The first latched fault on the body file.
    pub fn get_fault(&self) -> Option<Error> {
        self.file.get_fault()
    }

    /// True while the body file's volume is out of space.
    pub fn is_full(&self) -> bool {
        self.file.is_full()
    }

    /// Clears the body file's disk-full condition.
    pub fn reset_full(&self) {
        self.file.reset_full()
    }

    /// Byte position of a link.
    pub(crate) const fn link_to_position(link: Link<N>) -> usize {
        link.value() as usize * Self::STRIDE
    }

    /// Link of a byte position; terminal when out of the link's range.
    pub(crate) fn position_to_link(position: usize) -> Link<N> {
        let value = (position / Self::STRIDE) as u64;
        if value >= Link::<N>::TERMINAL.value() {
            Link::TERMINAL
        } else {
            Link::new(value)
        }
    }
}

impl<const N: usize, const K: usize, const S: usize> Clone for Manager<N, K, S> {
    fn clone(&self) -> Self {
        Self {
            file: self.file.clone(),
        }
    }
}
