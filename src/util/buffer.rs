/*!
A growable byte buffer with inline storage.

Encoders write their output into a [`Buffer`]. Most match trees are small,
so a buffer starts out writing into an inline array and only moves to a
heap allocation once that array overflows. The move is one way: once a
buffer has spilled onto the heap it stays there until it is dropped.
*/

use core::fmt;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// The number of bytes a buffer can hold before it allocates.
pub const INLINE_CAPACITY: usize = 512;

/// A byte accumulator with inline small-buffer storage and geometric growth.
///
/// Growing a buffer never loses bytes that were already written, regardless
/// of how many times it grows. Allocation failures are reported as errors
/// instead of aborting.
#[derive(Clone, Default)]
pub struct Buffer {
    bytes: SmallVec<[u8; INLINE_CAPACITY]>,
}

impl Buffer {
    /// Create a new empty buffer using only inline storage.
    pub fn new() -> Buffer {
        Buffer { bytes: SmallVec::new() }
    }

    /// The number of bytes written so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The number of bytes this buffer can hold without growing.
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// Returns true if this buffer has moved its contents to the heap.
    pub fn is_spilled(&self) -> bool {
        self.bytes.spilled()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume this buffer and return its contents.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes.into_vec()
    }

    /// Ensure there is room for at least `additional` more bytes.
    ///
    /// When the buffer must grow, its capacity is doubled. If doubling is
    /// still not enough, it grows to exactly what is needed.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let len = self.len();
        let cap = self.capacity();
        if cap - len >= additional {
            return Ok(());
        }
        let needed = len
            .checked_add(additional)
            .ok_or_else(|| Error::buffer_too_large(usize::MAX))?;
        let new_cap = core::cmp::max(cap.saturating_mul(2), needed);
        debug!(
            "growing buffer from {} to {} bytes (spilled: {})",
            cap,
            new_cap,
            self.is_spilled(),
        );
        self.bytes
            .try_grow(new_cap)
            .map_err(|_| Error::buffer_too_large(new_cap))
    }

    /// Append the given bytes.
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        self.reserve(data.len())?;
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    pub fn push(&mut self, byte: u8) -> Result<()> {
        self.extend(&[byte])
    }

    /// Append the decimal representation of an integer.
    pub fn push_int<I: itoa::Integer>(&mut self, n: I) -> Result<()> {
        let mut buf = itoa::Buffer::new();
        self.extend(buf.format(n).as_bytes())
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Buffer) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Buffer {}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use bstr::ByteSlice;

        f.debug_struct("Buffer")
            .field("data", &self.as_bytes().as_bstr())
            .field("capacity", &self.capacity())
            .field("spilled", &self.is_spilled())
            .finish()
    }
}
