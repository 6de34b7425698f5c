//! Keyed hash table assembly: hashhead + body manager.

use std::sync::Arc;

use crate::error::Error;
use crate::link::Link;
use crate::memory::map::MemoryMap;
use crate::memory::reader::Reader;
use crate::memory::writer::{Finalizer, Writer};
use crate::table::element::Element;
use crate::table::hashhead::HashHead;
use crate::table::iterator::Iter;
use crate::table::manager::Manager;

/// A durable key→value table with O(1) bucket lookup and chained collisions.
///
/// `N` is the link width, `K` the key width, `S` the payload size
/// ([`SLAB`](crate::SLAB) for variable-size elements). Element bytes are
/// `[next][key][payload]`; duplicate keys chain and iterate newest first.
///
/// Write path: allocate body space, stream the element through a writer,
/// then publish by pushing the link onto the key's bucket. A failure before
/// the publish orphans the allocated bytes but never corrupts the table.
pub struct Hashmap<const N: usize, const K: usize, const S: usize> {
    head: HashHead<N, K>,
    body: Manager<N, K, S>,
}

impl<const N: usize, const K: usize, const S: usize> Hashmap<N, K, S> {
    // Chained elements require a key; keyless tables are nomap/arraymap.
    const VALID: () = assert!(K > 0, "hashmap requires a keyed element");

    /// Assembles a table of `buckets` buckets over its head and body files.
    pub fn new(head: Arc<MemoryMap>, body: Arc<MemoryMap>, buckets: u64) -> Self {
        let () = Self::VALID;
        Self {
            head: HashHead::new(head, buckets),
            body: Manager::new(body),
        }
    }

    /// Formats the (empty, loaded) head file. Not thread safe.
    pub fn create(&self) -> bool {
        self.head.create()
    }

    /// False if the head file does not match the configuration or the
    /// recorded body count disagrees with the body file.
    pub fn verify(&self) -> bool {
        self.head.verify() && self.head.get_body_count() == Some(self.body.count())
    }

    /// Records the body count into the head (snapshot/close step).
    pub fn backup(&self) -> bool {
        self.head.set_body_count(self.body.count())
    }

    /// Truncates the body to the recorded count (recovery step).
    pub fn restore(&self) -> bool {
        match self.head.get_body_count() {
            Some(count) => self.body.truncate(count),
            None => false,
        }
    }

    /// The bucket count.
    pub fn buckets(&self) -> u64 {
        self.head.buckets()
    }

    /// Head file bytes.
    pub fn head_size(&self) -> usize {
        self.head.size()
    }

    /// Body file bytes.
    pub fn body_size(&self) -> usize {
        self.body.size()
    }

    /// Element count (byte count for slab tables).
    pub fn count(&self) -> Link<N> {
        self.body.count()
    }

    /// Reduces the element count; false if `count` exceeds it.
    pub fn truncate(&self, count: Link<N>) -> bool {
        self.body.truncate(count)
    }

    /// The first latched fault on either file.
    pub fn get_fault(&self) -> Option<Error> {
        self.head.get_fault().or_else(|| self.body.get_fault())
    }

    /// True while the body's volume is out of space.
    pub fn is_full(&self) -> bool {
        self.body.is_full()
    }

    /// Clears the disk-full condition.
    pub fn reset_full(&self) {
        self.body.reset_full()
    }

    /// Iterator over the key's chain, positioned at the newest match.
    ///
    /// The iterator holds the body's remap lock shared; see [`Iter`] for the
    /// re-entrancy rule.
    pub fn it(&self, key: [u8; K]) -> Iter<'_, N, K, S> {
        let top = self.head.top(&key);
        if top.is_terminal() {
            // Empty bucket: terminal without touching the body.
            return Iter::new(None, Link::TERMINAL, key);
        }
        Iter::new(self.body.body(), top, key)
    }

    /// The newest link for `key`; terminal when absent.
    pub fn first(&self, key: [u8; K]) -> Link<N> {
        self.it(key).link()
    }

    /// True if any element carries `key`.
    pub fn exists(&self, key: [u8; K]) -> bool {
        !self.first(key).is_terminal()
    }

    /// Reads the element at `link`.
    pub fn get<E: Element>(&self, link: Link<N>) -> Option<E> {
        let access = self.body.get(link)?;
        let mut source = Reader::new(&access, N + K, access.size());
        E::from_data(&mut source)
    }

    /// Reads the element under the iterator without re-acquiring the body.
    ///
    /// This is the safe read while an iterator is held: a fresh `get` would
    /// take another window and can deadlock against a concurrent remap.
    pub fn get_with<E: Element>(&self, iter: &Iter<'_, N, K, S>) -> Option<E> {
        if iter.link().is_terminal() {
            return None;
        }
        let memory = iter.memory()?;
        let position = Manager::<N, K, S>::link_to_position(iter.link());
        let mut source = Reader::new(memory, position + N + K, memory.size());
        E::from_data(&mut source)
    }

    /// Writes and publishes an element; false on failure.
    pub fn put<E: Element>(&self, key: [u8; K], element: &E) -> bool {
        !self.put_link(key, element).is_terminal()
    }

    /// Writes and publishes an element, returning its link (terminal on
    /// failure).
    pub fn put_link<E: Element>(&self, key: [u8; K], element: &E) -> Link<N> {
        let count = element.count();
        let link = self.body.allocate(count);
        if link.is_terminal() {
            return Link::TERMINAL;
        }
        let Some(access) = self.body.get(link) else {
            return Link::TERMINAL;
        };

        let total = if Manager::<N, K, S>::IS_SLAB {
            count
        } else {
            count * Manager::<N, K, S>::STRIDE
        };

        // The next slot is written at publish time by the finalizer.
        let mut writer = Writer::new(&access, N, total);
        writer.write_bytes(&key);

        let mut finalizer = Finalizer::new(writer, &self.head, self.head.index(&key), link);
        if !element.to_data(finalizer.writer()) {
            return Link::TERMINAL;
        }
        if finalizer.finalize() {
            link
        } else {
            Link::TERMINAL
        }
    }

    #[cfg(test)]
    pub(crate) fn head(&self) -> &HashHead<N, K> {
        &self.head
    }
}

impl<const N: usize, const K: usize, const S: usize> Clone for Hashmap<N, K, S> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            body: self.body.clone(),
        }
    }
}
