//! Fixed-bucket hash head files.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::Error;
use crate::keys;
use crate::link::Link;
use crate::memory::access::Access;
use crate::memory::map::MemoryMap;

/// A bucket-array head with a fixed bucket count.
///
/// On disk: an `N`-byte body-count prefix followed by `buckets` slots of `N`
/// bytes each, little-endian throughout. An empty bucket holds the terminal
/// (all-ones) pattern. One mutex serializes pushes; bucket reads take it
/// shared.
pub struct HashHead<const N: usize, const K: usize> {
    file: Arc<MemoryMap>,
    buckets: u64,
    mutex: Arc<RwLock<()>>,
}

impl<const N: usize, const K: usize> HashHead<N, K> {
    /// Binds a head of `buckets` slots to its file.
    pub fn new(file: Arc<MemoryMap>, buckets: u64) -> Self {
        Self {
            file,
            buckets: buckets.max(1),
            mutex: Arc::new(RwLock::new(())),
        }
    }

    /// The head file's expected byte length.
    pub fn size(&self) -> usize {
        (1 + self.buckets as usize) * N
    }

    /// The bucket count.
    pub fn buckets(&self) -> u64 {
        self.buckets
    }

    /// Formats an empty head file: zero body count, all buckets terminal.
    ///
    /// The file must be loaded and empty. Not thread safe.
    pub fn create(&self) -> bool {
        if self.file.size() != 0 || self.file.allocate(self.size()).is_none() {
            return false;
        }
        let Some(access) = self.file.get(0) else {
            return false;
        };
        access.fill(0, N, 0x00) && access.fill(N, self.buckets as usize * N, 0xff)
    }

    /// False if the head file size does not match the bucket count.
    pub fn verify(&self) -> bool {
        let verified = self.file.size() == self.size();
        if !verified {
            warn!(
                path = %self.file.path().display(),
                size = self.file.size(),
                expected = self.size(),
                "head file size mismatch"
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

    /// Bucket index of a key. Every key maps to a valid bucket.
    pub fn index(&self, key: &[u8; K]) -> u64 {
        let hash = keys::hash(key);
        if self.buckets.is_power_of_two() {
            hash & (self.buckets - 1)
        } else {
            hash % self.buckets
        }
    }

    /// The chain-start link in the key's bucket.
    pub fn top(&self, key: &[u8; K]) -> Link<N> {
        self.top_at(self.index(key))
    }

    /// The chain-start link in bucket `index`.
    pub fn top_at(&self, index: u64) -> Link<N> {
        let _shared = self.mutex.read();
        let Some(access) = self.file.get(0) else {
            return Link::TERMINAL;
        };
        match access.read_array::<N>(Self::slot(index)) {
            Some(bytes) => Link::from_bytes(bytes),
            None => Link::TERMINAL,
        }
    }

    /// Publishes `current` at the front of bucket `index`.
    ///
    /// Under the exclusive lock, the displaced bucket value is written to
    /// the element's next slot (`next_at` within `body`) and the bucket is
    /// replaced with `current`. Readers that observe the new bucket value
    /// therefore always see a fully formed element.
    pub(crate) fn push(
        &self,
        current: Link<N>,
        body: &Access<'_>,
        next_at: usize,
        index: u64,
    ) -> bool {
        let _exclusive = self.mutex.write();
        let Some(head) = self.file.get(0) else {
            return false;
        };
        let at = Self::slot(index);
        let Some(next) = head.read_array::<N>(at) else {
            return false;
        };
        body.write(next_at, &next) && head.write(at, &current.to_bytes())
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

impl<const N: usize, const K: usize> Clone for HashHead<N, K> {
    fn clone(&self) -> Self {
        Self {
            file: self.file.clone(),
            buckets: self.buckets,
            mutex: self.mutex.clone(),
        }
    }
}
