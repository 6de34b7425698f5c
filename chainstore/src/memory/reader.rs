//! Byte source over an access window.

use crate::link::Link;
use crate::memory::access::Access;

/// A little-endian byte reader bounded to `[start, end)` of a window.
///
/// Reading past the end invalidates the stream: the failing read and every
/// later one return zeroed defaults, and `is_valid` reports false. Element
/// deserializers check validity once at the end instead of after every read.
pub struct Reader<'m, 'a> {
    access: &'m Access<'a>,
    at: usize,
    end: usize,
    valid: bool,
}

impl<'m, 'a> Reader<'m, 'a> {
    /// Binds a reader to `[start, end)`, clamped to the window.
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

    /// False once any read has run past the end.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Bytes left before the stream is exhausted.
    pub fn remaining(&self) -> usize {
        self.end - self.at.min(self.end)
    }

    /// True when every byte has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.at >= self.end
    }

    /// Advances without reading; invalidates if the skip overruns.
    pub fn skip(&mut self, bytes: usize) {
        if bytes > self.remaining() {
            self.valid = false;
            self.at = self.end;
        } else {
            self.at += bytes;
        }
    }

    /// Reads one byte.
    pub fn read_byte(&mut self) -> u8 {
        self.read_array::<1>()[0]
    }

    /// Reads a fixed-size byte array.
    pub fn read_array<const N: usize>(&mut self) -> [u8; N] {
        if !self.valid || N > self.remaining() {
            self.valid = false;
            self.at = self.end;
            return [0u8; N];
        }
        // In bounds per the remaining() check.
        let mut array = [0u8; N];
        if let Some(bytes) = self.access.read(self.at, N) {
            array.copy_from_slice(bytes);
            self.at += N;
        } else {
            self.valid = false;
        }
        array
    }

    /// Fills `out` from the stream.
    pub fn read_bytes(&mut self, out: &mut [u8]) {
        if !self.valid || out.len() > self.remaining() {
            self.valid = false;
            self.at = self.end;
            out.fill(0);
            return;
        }
        if let Some(bytes) = self.access.read(self.at, out.len()) {
            out.copy_from_slice(bytes);
            self.at += out.len();
        } else {
            self.valid = false;
        }
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> u16 {
        u16::from_le_bytes(self.read_array::<2>())
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> u32 {
        u32::from_le_bytes(self.read_array::<4>())
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> u64 {
        u64::from_le_bytes(self.read_array::<8>())
    }

    /// Reads a link of the given width; terminal when the stream is invalid.
    pub fn read_link<const N: usize>(&mut self) -> Link<N> {
        let bytes = self.read_array::<N>();
        if self.valid {
            Link::from_bytes(bytes)
        } else {
            Link::TERMINAL
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::map::MemoryMap;

    fn fixture(contents: &[u8]) -> (tempfile::TempDir, MemoryMap) {
        let root = tempfile::tempdir().unwrap();
        let map = MemoryMap::new(root.path().join("reader.data"), 64, 0);
        map.open().unwrap();
        map.load().unwrap();
        map.allocate(contents.len()).unwrap();
        map.get(0).unwrap().write(0, contents);
        (root, map)
    }

    #[test]
    fn typed_reads_are_little_endian() {
        let (_root, map) = fixture(&[0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xff, 0xff, 0xff]);
        let access = map.get(0).unwrap();
        let mut reader = Reader::new(&access, 0, access.size());

        assert_eq!(reader.read_byte(), 0x01);
        assert_eq!(reader.read_u16(), 0x1234);
        assert_eq!(reader.read_u32(), 0x1234_5678);
        assert_eq!(reader.read_link::<3>(), Link::<3>::TERMINAL);
        assert!(reader.is_valid());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn overrun_latches_invalid() {
        let (_root, map) = fixture(&[1, 2, 3]);
        let access = map.get(0).unwrap();
        let mut reader = Reader::new(&access, 0, access.size());

        assert_eq!(reader.read_u16(), 0x0201);
        assert_eq!(reader.read_u32(), 0, "short read yields the default");
        assert!(!reader.is_valid());
        assert_eq!(reader.read_byte(), 0, "stream stays invalid");
        assert!(reader.read_link::<4>().is_terminal());
    }

    #[test]
    fn skip_and_window() {
        let (_root, map) = fixture(&[1, 2, 3, 4, 5, 6]);
        let access = map.get(0).unwrap();
        let mut reader = Reader::new(&access, 2, 5);

        assert_eq!(reader.remaining(), 3);
        reader.skip(1);
        assert_eq!(reader.read_byte(), 4);
        let mut out = [0u8; 1];
        reader.read_bytes(&mut out);
        assert_eq!(out, [5]);
        assert!(reader.is_exhausted());
        reader.skip(1);
        assert!(!reader.is_valid());
    }
}
