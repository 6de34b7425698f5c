//! Ordinal→slab assembly: growing array head + unkeyed body.

use std::sync::Arc;

use crate::error::Error;
use crate::link::Link;
use crate::memory::map::MemoryMap;
use crate::memory::reader::Reader;
use crate::memory::writer::Writer;
use crate::table::arrayhead::ArrayHead;
use crate::table::element::Element;
use crate::table::manager::Manager;

/// A table keyed by a dense small integer, mapping each ordinal to one
/// element in the body.
///
/// The head's bucket array grows with writes (the ordinal is the bucket
/// index); the body is typically a slab, holding variable-size elements
/// with no next link and no key.
pub struct Arraymap<const N: usize, const S: usize> {
    head: ArrayHead<N>,
    body: Manager<N, 0, S>,
}

impl<const N: usize, const S: usize> Arraymap<N, S> {
    /// Assembles a table with `buckets` initial slots over its files.
    pub fn new(head: Arc<MemoryMap>, body: Arc<MemoryMap>, buckets: u64) -> Self {
        Self {
            head: ArrayHead::new(head, buckets.max(1)),
            body: Manager::new(body),
        }
    }

    /// Formats the (empty, loaded) head file. Not thread safe.
    pub fn create(&self) -> bool {
        self.head.create()
    }

    /// False if the head file is malformed or the recorded body count
    /// disagrees with the body file.
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

    /// The current bucket count (grows with writes).
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

    /// Element count (byte count for slab bodies).
    pub fn count(&self) -> Link<N> {
        self.body.count()
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

    /// The body link stored for `key`; terminal when unset.
    pub fn at(&self, key: u64) -> Link<N> {
        self.head.at(key)
    }

    /// True if `key` has been assigned.
    pub fn exists(&self, key: u64) -> bool {
        !self.at(key).is_terminal()
    }

    /// Reads the element at `link`.
    pub fn get<E: Element>(&self, link: Link<N>) -> Option<E> {
        let access = self.body.get(link)?;
        let mut source = Reader::new(&access, 0, access.size());
        E::from_data(&mut source)
    }

    /// Reads the element assigned to `key`.
    pub fn find<E: Element>(&self, key: u64) -> Option<E> {
        self.get(self.at(key))
    }

    /// Writes an element and assigns it to `key`; false on failure.
    ///
    /// Reassigning a key orphans the old element's bytes (all mutation is
    /// append-then-publish).
    pub fn put<E: Element>(&self, key: u64, element: &E) -> bool {
        !self.put_link(key, element).is_terminal()
    }

    /// Writes an element and assigns it to `key`, returning its link.
    pub fn put_link<E: Element>(&self, key: u64, element: &E) -> Link<N> {
        let count = element.count();
        let link = self.body.allocate(count);
        if link.is_terminal() {
            return Link::TERMINAL;
        }

        let total = if Manager::<N, 0, S>::IS_SLAB {
            count
        } else {
            count * Manager::<N, 0, S>::STRIDE
        };

        {
            let Some(access) = self.body.get(link) else {
                return Link::TERMINAL;
            };
            let mut writer = Writer::new(&access, 0, total);
            if !element.to_data(&mut writer) || !writer.is_valid() {
                return Link::TERMINAL;
            }
            // The body window drops here; the head push below may grow the
            // head file, never the body.
        }

        if self.head.push(link, key) {
            link
        } else {
            Link::TERMINAL
        }
    }
}

impl<const N: usize, const S: usize> Clone for Arraymap<N, S> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            body: self.body.clone(),
        }
    }
}
