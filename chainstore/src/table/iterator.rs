//! Hash-chain iteration.

use crate::keys;
use crate::link::Link;
use crate::memory::access::Access;
use crate::table::manager::stride;

/// Walks a bucket chain, yielding elements whose stored key matches the
/// search key, newest first.
///
/// The iterator holds an [`Access`] over the table's body, which holds the
/// body's remap lock shared. Do not, on the same thread, write to the same
/// table while an iterator is alive: a write that grows the body waits for
/// the shared lock and deadlocks. Collect links into a local vector, drop
/// (or [`release`](Self::release)) the iterator, then operate on the links.
pub struct Iter<'a, const N: usize, const K: usize, const S: usize> {
    memory: Option<Access<'a>>,
    key: [u8; K],
    link: Link<N>,
}

impl<'a, const N: usize, const K: usize, const S: usize> Iter<'a, N, K, S> {
    const STRIDE: usize = stride(N, K, S);

    /// Positions the iterator at the first chain element matching `key`,
    /// starting from the bucket-top `start`.
    pub(crate) fn new(memory: Option<Access<'a>>, start: Link<N>, key: [u8; K]) -> Self {
        let mut iter = Self {
            memory,
            key,
            link: start,
        };
        if !iter.link.is_terminal() && iter.memory.is_some() && !iter.matches(iter.link) {
            iter.advance();
        }
        iter
    }

    /// Advances to the next matching element; false at the chain's end.
    pub fn advance(&mut self) -> bool {
        while !self.link.is_terminal() {
            self.link = self.next_of(self.link);
            if self.link.is_terminal() {
                break;
            }
            if self.matches(self.link) {
                return true;
            }
        }
        false
    }

    /// The current link; terminal when no match remains.
    pub fn link(&self) -> Link<N> {
        self.link
    }

    /// True while the iterator is positioned on a match.
    pub fn found(&self) -> bool {
        !self.link.is_terminal()
    }

    /// The search key.
    pub fn key(&self) -> &[u8; K] {
        &self.key
    }

    /// The held body window, for reads that must not re-lock the body.
    pub(crate) fn memory(&self) -> Option<&Access<'a>> {
        self.memory.as_ref()
    }

    /// Releases the body window (and its remap lock); the iterator becomes
    /// terminal.
    pub fn release(&mut self) {
        self.memory = None;
        self.link = Link::TERMINAL;
    }

    /// Byte position of an element within the body window.
    fn position(link: Link<N>) -> usize {
        link.value() as usize * Self::STRIDE
    }

    /// The element's next link; terminal if the element is out of bounds.
    fn next_of(&self, link: Link<N>) -> Link<N> {
        let Some(memory) = self.memory.as_ref() else {
            return Link::TERMINAL;
        };
        match memory.read_array::<N>(Self::position(link)) {
            Some(bytes) => Link::from_bytes(bytes),
            None => Link::TERMINAL,
        }
    }

    /// Compares the element's stored key against the search key.
    fn matches(&self, link: Link<N>) -> bool {
        let Some(memory) = self.memory.as_ref() else {
            return false;
        };
        match memory.read(Self::position(link) + N, K) {
            Some(stored) => keys::compare(stored, &self.key),
            None => false,
        }
    }
}
