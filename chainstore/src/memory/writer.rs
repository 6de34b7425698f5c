//! Byte sink over an access window, and the publishing finalizer.

use crate::link::Link;
use crate::memory::access::Access;
use crate::table::hashhead::HashHead;

/// A little-endian byte writer bounded to `[start, end)` of a window.
///
/// Writing past the end invalidates the stream and discards the failing
/// write; `is_valid` then reports false. Element serializers are checked
/// once, at publish time, by [`Finalizer::finalize`].
pub struct Writer<'m, 'a> {
    access: &'m Access<'a>,
    at: usize,
    end: usize,
    valid: bool,
}

impl<'m, 'a> Writer<'m, 'a> {
    /// Binds a writer to `[start, end)`, clamped to the window.
    pub fn new(access: &'m Access<'a>, start: usize, end: usize) -> Self {
        let end = end.min(access.size());
        let valid = start <= end;
        Self {
            access,
            at: start,
            end,
            valid,
        }
    }

    /// False once any write has run past the end.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Bytes left in the stream.
    pub fn remaining(&self) -> usize {
        self.end - self.at.min(self.end)
    }

    /// Advances without writing; invalidates if the skip overruns.
    pub fn skip(&mut self, bytes: usize) {
        if bytes > self.remaining() {
            self.valid = false;
            self.at = self.end;
        } else {
            self.at += bytes;
        }
    }

    /// Writes raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if !self.valid || bytes.len() > self.remaining() {
            self.valid = false;
            self.at = self.end;
            return;
        }
        if self.access.write(self.at, bytes) {
            self.at += bytes.len();
        } else {
            self.valid = false;
        }
    }

    /// Writes one byte.
    pub fn write_byte(&mut self, byte: u8) {
        self.write_bytes(&[byte]);
    }

    /// Writes a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Writes a link in its disk form.
    pub fn write_link<const N: usize>(&mut self, link: Link<N>) {
        self.write_bytes(&link.to_bytes());
    }

    pub(crate) fn access(&self) -> &'m Access<'a> {
        self.access
    }
}

/// Defers the head publish until an element is fully written.
///
/// The element's bytes (key and payload) are streamed through the contained
/// writer into freshly allocated, still-unreachable body space. `finalize`
/// then verifies the stream and performs the publish: under the head's
/// exclusive lock, the displaced bucket link is written into the element's
/// `next` slot and the bucket is pointed at the element. A writer failure
/// orphans the allocated bytes but leaves the table intact.
pub struct Finalizer<'m, 'a, const N: usize, const K: usize> {
    writer: Writer<'m, 'a>,
    head: &'m HashHead<N, K>,
    index: u64,
    link: Link<N>,
}

impl<'m, 'a, const N: usize, const K: usize> Finalizer<'m, 'a, N, K> {
    /// Binds the publish of `link` into bucket `index` to stream completion.
    pub fn new(writer: Writer<'m, 'a>, head: &'m HashHead<N, K>, index: u64, link: Link<N>) -> Self {
        Self {
            writer,
            head,
            index,
            link,
        }
    }

    /// The element byte stream.
    pub fn writer(&mut self) -> &mut Writer<'m, 'a> {
        &mut self.writer
    }

    /// Verifies the stream and publishes the element; false leaves the
    /// element unreachable.
    pub fn finalize(self) -> bool {
        if !self.writer.is_valid() {
            return false;
        }
        // The element's next slot is the first field of its window.
        self.head
            .push(self.link, self.writer.access(), 0, self.index)
    }
}
