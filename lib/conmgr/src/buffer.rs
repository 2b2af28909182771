//! A dynamically sized FIFO byte buffer, bounded by a caller-supplied
//! maximum. Data is appended at the tail and consumed from the head.
//!
//! API shape grounded on `neutronium::net::buffer::Buffer`, but backed by a
//! compacting `Vec<u8>` rather than the teacher's `slice_deque` crate: the
//! latter's double-mapped virtual-memory trick is unsafe and not something
//! to write blind, without a compiler to check it (see DESIGN.md).

use std::io;

const GROWTH_INCREMENT: usize = 4096;

pub struct Buffer {
    data: Vec<u8>,
    head: usize,
    max_size: usize,
}

impl Buffer {
    /// Creates a buffer with the given initial capacity, growable up to
    /// `max_size`.
    pub fn new(initial: usize, max_size: usize) -> Buffer {
        Buffer {
            data: Vec::with_capacity(initial),
            head: 0,
            max_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Remaining capacity before `max_size` is hit.
    #[inline]
    pub fn free_capacity(&self) -> usize {
        self.max_size.saturating_sub(self.len())
    }

    /// Slice over the unconsumed data.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Advances the head (consumer) cursor by `count` bytes.
    pub fn move_head(&mut self, count: usize) {
        self.head += count;
        assert!(self.head <= self.data.len(), "move_head past tail");
        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        } else if self.head > GROWTH_INCREMENT {
            self.compact();
        }
    }

    /// Drops all buffered data.
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    fn compact(&mut self) {
        self.data.drain(..self.head);
        self.head = 0;
    }

    /// Ensures at least `want` bytes of free capacity exist at the tail,
    /// bounded by `max_size`. Returns the number of bytes actually made
    /// available (may be less than `want` if `max_size` would be exceeded).
    fn reserve_tail(&mut self, want: usize) -> usize {
        self.compact();
        let available = self.free_capacity();
        let grow_to = want.min(available);
        let target_len = self.data.len() + grow_to;
        if self.data.capacity() < target_len {
            self.data.reserve(target_len - self.data.len());
        }
        grow_to
    }

    /// Reads from `reader` into the buffer's free tail capacity, advancing
    /// the tail. Returns the number of bytes read (possibly zero on
    /// `WouldBlock`, which is surfaced as-is via the `io::Result`).
    pub fn ingress<R: io::Read>(&mut self, mut reader: R, want: usize) -> io::Result<usize> {
        let room = self.reserve_tail(want.max(GROWTH_INCREMENT).min(self.free_capacity().max(1)));
        if room == 0 {
            return Ok(0);
        }

        let old_len = self.data.len();
        self.data.resize(old_len + room, 0);
        match reader.read(&mut self.data[old_len..old_len + room]) {
            Ok(n) => {
                self.data.truncate(old_len + n);
                Ok(n)
            }
            Err(err) => {
                self.data.truncate(old_len);
                Err(err)
            }
        }
    }

    /// Writes all buffered data to `writer`, advancing the head. Returns
    /// the number of bytes written before a `WouldBlock` or the buffer
    /// draining entirely.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let mut written = 0;
        while !self.is_empty() {
            match writer.write(self.read_slice()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    written += n;
                    self.move_head(n);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock && written > 0 => break,
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }

    /// Appends `data` at the tail, failing if it would exceed `max_size`.
    pub fn push(&mut self, data: &[u8]) -> io::Result<()> {
        if data.len() > self.free_capacity() {
            return Err(io::Error::new(io::ErrorKind::Other, "buffer overrun"));
        }
        self.reserve_tail(data.len());
        self.data.extend_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_push_and_drain() {
        let mut buf = Buffer::new(16, 1024);
        buf.push(b"hello").unwrap();
        assert_eq!(buf.read_slice(), b"hello");

        let mut out = Vec::new();
        let n = buf.egress(&mut out).unwrap();
        assert_eq!(n, 5);
        assert!(buf.is_empty());
        assert_eq!(out, b"hello");
    }

    #[test]
    fn ingress_reads_available_bytes() {
        let mut buf = Buffer::new(16, 1024);
        let mut cursor = Cursor::new(b"abcdef".to_vec());
        let n = buf.ingress(&mut cursor, 512).unwrap();
        assert_eq!(n, 6);
        assert_eq!(buf.read_slice(), b"abcdef");
    }

    #[test]
    fn push_rejects_over_capacity() {
        let mut buf = Buffer::new(4, 4);
        assert!(buf.push(b"12345").is_err());
        buf.push(b"1234").unwrap();
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn move_head_compacts_and_frees_capacity() {
        let mut buf = Buffer::new(16, 16);
        buf.push(b"0123456789").unwrap();
        buf.move_head(5);
        assert_eq!(buf.read_slice(), b"56789");
        // after consuming, pushing more than remaining free_capacity
        // relative to max_size but within post-compaction room succeeds.
        buf.push(b"abcdefghij").unwrap();
        assert_eq!(buf.read_slice(), b"56789abcdefghij");
    }
}
