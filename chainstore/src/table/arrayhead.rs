//! Dynamically growing array head files.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::Error;
use crate::link::Link;
use crate::memory::map::MemoryMap;

/// A bucket-array head whose logical index is the key itself.
///
/// Used for tables keyed by a dense small integer (block height). The
/// bucket array grows with writes: a push to index `i` extends the array
/// through `i`, filling new slots with the terminal pattern. A zero-bucket
/// arrayhead carries only the body-count prefix and serves tables with no
/// index at all (nomap).
pub struct ArrayHead<const N: usize> {
    file: Arc<MemoryMap>,
    initial: u64,
    mutex: Arc<RwLock<()>>,
}

impl<const N: usize> ArrayHead<N> {
    /// Binds a head with `initial` starting buckets to its file.
    pub fn new(file: Arc<MemoryMap>, initial: u64) -> Self {
        Self {
            file,
            initial,
            mutex: Arc::new(RwLock::new(())),
        }
    }

    /// The head file's current byte length.
    pub fn size(&self) -> usize {
        self.file.size()
    }

    /// The current bucket count (grows with writes).
    pub fn buckets(&self) -> u64 {
        (self.file.size().saturating_sub(N) / N) as u64
    }

    /// False for the zero-bucket (nomap) form, which cannot be indexed.
    pub fn enabled(&self) -> bool {
        self.initial > 0
    }

    /// Formats an empty head file: zero body count plus the initial buckets.
    ///
    /// The file must be loaded and empty. Not thread safe.
    pub fn create(&self) -> bool {
        let size = (1 + self.initial as usize) * N;
        if self.file.size() != 0 || self.file.allocate(size).is_none() {
            return false;
        }
        let Some(access) = self.file.get(0) else {
            return false;
        };
        access.fill(0, N, 0x00) && access.fill(N, self.initial as usize * N, 0xff)
    }

    /// False if the head file cannot hold a whole number of buckets or has
    /// shrunk below the configured initial count.
    pub fn verify(&self) -> bool {
        let size = self.file.size();
        let verified = size >= N && (size - N) % N == 0 && self.buckets() >= self.initial;
        if !verified {
            warn!(
                path = %self.file.path().display(),
                size,
                "array head file size mismatch"
            );
        }
        verified
    }

    /// The body byte count recorded at the last clean flush.
    pub fn get_body_count(&self) -> Option<Link<N>> {
        let access = self.file.get(0)?;
        Some(Link::from_bytes(access.read_array::<N>(0)?))
    }

    /// Records the body byte count.
    pub fn set_body_count(&self, count: Link<N>) -> bool {
        match self.file.get(0) {
            Some(access) => access.write(0, &count.to_bytes()),
            None => false,
        }
    }

    /// The link stored at bucket `index`; terminal beyond the array.
    pub fn at(&self, index: u64) -> Link<N> {
        let _shared = self.mutex.read();
        if index >= self.buckets() {
            return Link::TERMINAL;
        }
        let Some(access) = self.file.get(0) else {
            return Link::TERMINAL;
        };
        match access.read_array::<N>(Self::slot(index)) {
            Some(bytes) => Link::from_bytes(bytes),
            None => Link::TERMINAL,
        }
    }

    /// Assigns `current` to bucket `index`, growing the array as needed.
    pub(crate) fn push(&self, current: Link<N>, index: u64) -> bool {
        let _exclusive = self.mutex.write();

        let buckets = self.buckets();
        if index >= buckets {
            let Some(through) = index.checked_add(1) else {
                return false;
            };
            // Grow through the target, terminal-filled. No access is held
            // across the allocation (it may remap this file).
            let grow = (through - buckets) as usize * N;
            let Some(position) = self.file.allocate(grow) else {
                return false;
            };
            let Some(access) = self.file.get(position) else {
                return false;
            };
            if !access.fill(0, grow, 0xff) {
                return false;
            }
        }

        let Some(access) = self.file.get(0) else {
            return false;
        };
        access.write(Self::slot(index), &current.to_bytes())
    }

    /// The first latched fault on the head file.
    pub fn get_fault(&self) -> Option<Error> {
        self.file.get_fault()
    }

    /// Byte offset of a bucket slot within the head file.
    const fn slot(index: u64) -> usize {
        (1 + index as usize) * N
    }
}

impl<const N: usize> Clone for ArrayHead<N> {
    fn clone(&self) -> Self {
        Self {
            file: self.file.clone(),
            initial: self.initial,
            mutex: self.mutex.clone(),
        }
    }
}
