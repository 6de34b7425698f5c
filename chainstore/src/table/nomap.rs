//! Dense ordinal record array: zero-bucket head + unkeyed body.

use std::sync::Arc;

use crate::error::Error;
use crate::link::Link;
use crate::memory::map::MemoryMap;
use crate::memory::reader::Reader;
use crate::memory::writer::Writer;
use crate::table::arrayhead::ArrayHead;
use crate::table::element::Element;
use crate::table::manager::Manager;

/// An append-only array of fixed-size records addressed by ordinal.
///
/// There is no key, no chain, and no bucket array: the head file carries
/// only the recorded body count, and a record's link *is* its ordinal.
/// Used for dense ordinal tables (height→header hash and the like).
pub struct Nomap<const N: usize, const S: usize> {
    head: ArrayHead<N>,
    body: Manager<N, 0, S>,
}

impl<const N: usize, const S: usize> Nomap<N, S> {
    /// Assembles the table over its head and body files.
    pub fn new(head: Arc<MemoryMap>, body: Arc<MemoryMap>) -> Self {
        Self {
            head: ArrayHead::new(head, 0),
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

    /// Head file bytes.
    pub fn head_size(&self) -> usize {
        self.head.size()
    }

    /// Body file bytes.
    pub fn body_size(&self) -> usize {
        self.body.size()
    }

    /// Record count (byte count for slab bodies).
    pub fn count(&self) -> Link<N> {
        self.body.count()
    }

    /// Reduces the record count; false if `count` exceeds it.
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

    /// Reads the record at `link`.
    pub fn get<E: Element>(&self, link: Link<N>) -> Option<E> {
        let access = self.body.get(link)?;
        let mut source = Reader::new(&access, 0, access.size());
        E::from_data(&mut source)
    }

    /// Appends a record; false on failure.
    pub fn put<E: Element>(&self, element: &E) -> bool {
        !self.put_link(element).is_terminal()
    }

    /// Appends a record, returning its ordinal link (terminal on failure).
    pub fn put_link<E: Element>(&self, element: &E) -> Link<N> {
        let count = element.count();
        let link = self.body.allocate(count);
        if link.is_terminal() {
            return Link::TERMINAL;
        }
        let Some(access) = self.body.get(link) else {
            return Link::TERMINAL;
        };

        let total = if Manager::<N, 0, S>::IS_SLAB {
            count
        } else {
            count * Manager::<N, 0, S>::STRIDE
        };

        let mut writer = Writer::new(&access, 0, total);
        if element.to_data(&mut writer) && writer.is_valid() {
            link
        } else {
            Link::TERMINAL
        }
    }
}

impl<const N: usize, const S: usize> Clone for Nomap<N, S> {
    fn clone(&self) -> Self {
        Self {
            head: self.head.clone(),
            body: self.body.clone(),
        }
    }
}
