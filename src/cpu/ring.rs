//! Cursor over a fixed-size circular byte region.
//!
//! The reader is the only place that knows about wraparound: values that
//! straddle the end of the region are stitched together from the tail and
//! the head of the buffer before being handed to [`Decode::decode`].

use std::ptr::{self, NonNull};

/// Largest value [`CyclicBuffer::read`] can materialize in one call.
pub const MAX_DECODE_SIZE: usize = 64;

/// A fixed-size value decoded from native-endian bytes.
pub trait Decode: Sized {
    /// Number of bytes consumed from the buffer.
    const SIZE: usize;

    /// Build the value from exactly `SIZE` bytes.
    fn decode(bytes: &[u8]) -> Self;
}

/// Reader over a circular region of `capacity` bytes.
///
/// `total_read() % capacity == offset` holds after every operation.
pub struct CyclicBuffer {
    base: NonNull<u8>,
    capacity: usize,
    /// Physical offset of the next unread byte
    offset: usize,
    /// Logical cursor, never wraps
    total: u64,
}

impl CyclicBuffer {
    /// Create a reader over `capacity` bytes at `base`, starting at logical
    /// position `start`.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of `capacity` bytes for as long as the
    /// reader is used, and `capacity` must be non-zero.
    pub unsafe fn from_raw_parts(base: *const u8, capacity: usize, start: u64) -> Self {
        debug_assert!(capacity > 0, "cyclic buffer must not be empty");
        CyclicBuffer {
            base: NonNull::new(base as *mut u8).unwrap_or(NonNull::dangling()),
            capacity,
            offset: (start % capacity as u64) as usize,
            total: start,
        }
    }

    /// Copy the next `out.len()` bytes into `out` and advance the cursor.
    pub fn read_into(&mut self, out: &mut [u8]) {
        let len = out.len();
        debug_assert!(len <= self.capacity, "read larger than the buffer");

        let first = len.min(self.capacity - self.offset);
        let rest = len - first;

        // SAFETY: offset < capacity and first <= capacity - offset, rest <= offset,
        // so both copies stay inside the region guaranteed by from_raw_parts.
        unsafe {
            ptr::copy_nonoverlapping(self.base.as_ptr().add(self.offset), out.as_mut_ptr(), first);
            if rest > 0 {
                ptr::copy_nonoverlapping(self.base.as_ptr(), out.as_mut_ptr().add(first), rest);
            }
        }

        self.advance(len);
    }

    /// Decode the next `T::SIZE` bytes as a `T`.
    pub fn read<T: Decode>(&mut self) -> T {
        const { assert!(T::SIZE <= MAX_DECODE_SIZE) };

        let mut scratch = [0u8; MAX_DECODE_SIZE];
        let bytes = &mut scratch[..T::SIZE];
        self.read_into(bytes);
        T::decode(bytes)
    }

    /// Advance the cursor by `len` bytes without reading them.
    pub fn skip(&mut self, len: usize) {
        debug_assert!(len <= self.capacity, "skip larger than the buffer");
        self.advance(len);
    }

    /// Logical number of bytes consumed since position zero.
    pub fn total_read(&self) -> u64 {
        self.total
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn advance(&mut self, len: usize) {
        self.offset = (self.offset + len) % self.capacity;
        self.total += len as u64;
    }
}

/// Read a native-endian `u16` at `at`.
pub(crate) fn ne_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([bytes[at], bytes[at + 1]])
}

/// Read a native-endian `u32` at `at`.
pub(crate) fn ne_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Read a native-endian `u64` at `at`.
pub(crate) fn ne_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_ne_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Word(u64);

    impl Decode for Word {
        const SIZE: usize = 8;

        fn decode(bytes: &[u8]) -> Self {
            Word(ne_u64(bytes, 0))
        }
    }

    fn buffer(data: &[u8], start: u64) -> CyclicBuffer {
        unsafe { CyclicBuffer::from_raw_parts(data.as_ptr(), data.len(), start) }
    }

    #[test]
    fn test_read_across_the_end() {
        let data: Vec<u8> = (0..16).collect();
        let mut ring = buffer(&data, 0);
        ring.skip(12);

        let mut out = [0u8; 8];
        ring.read_into(&mut out);

        assert_eq!(out, [12, 13, 14, 15, 0, 1, 2, 3]);
        assert_eq!(ring.total_read(), 20);

        // physical cursor now sits at the remainder length
        let mut next = [0u8; 1];
        ring.read_into(&mut next);
        assert_eq!(next, [4]);
    }

    #[test]
    fn test_typed_read_wraps() {
        let data: Vec<u8> = (0..16).collect();
        let mut ring = buffer(&data, 12);

        let word: Word = ring.read();
        assert_eq!(word.0, u64::from_ne_bytes([12, 13, 14, 15, 0, 1, 2, 3]));
    }

    #[test]
    fn test_matches_unwrapped_reference() {
        const CAPACITY: usize = 16;
        let data: Vec<u8> = (0..CAPACITY as u8).map(|b| b.wrapping_mul(7)).collect();

        for start in 0..(3 * CAPACITY as u64) {
            for size in 0..=CAPACITY {
                let reference: Vec<u8> = (start..start + size as u64)
                    .map(|i| data[(i % CAPACITY as u64) as usize])
                    .collect();

                let mut ring = buffer(&data, start);
                let mut out = vec![0u8; size];
                ring.read_into(&mut out);

                assert_eq!(out, reference, "start={start} size={size}");
            }
        }
    }

    #[test]
    fn test_cursor_is_sum_of_requests() {
        let data = [0u8; 10];
        let mut ring = buffer(&data, 0);
        let mut out = [0u8; 7];

        ring.read_into(&mut out);
        ring.skip(9);
        ring.read_into(&mut out[..3]);
        ring.skip(10);

        assert_eq!(ring.total_read(), 7 + 9 + 3 + 10);
        assert_eq!(ring.offset, (ring.total_read() % 10) as usize);
    }

    #[test]
    fn test_native_endian_helpers() {
        let bytes = 0x1122_3344_5566_7788u64.to_ne_bytes();
        assert_eq!(ne_u64(&bytes, 0), 0x1122_3344_5566_7788);

        let word = 0xdead_beefu32.to_ne_bytes();
        assert_eq!(ne_u32(&word, 0), 0xdead_beef);
        assert_eq!(ne_u16(&0x0102u16.to_ne_bytes(), 0), 0x0102);
    }
}
