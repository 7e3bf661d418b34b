//! Fixed-capacity write buffer used to assemble a probe frame.
//!
//! The buffer lives on the stack for the duration of one probe attempt so that
//! the alarm path never allocates. Appends are all-or-nothing: a write that
//! does not fit leaves the buffer untouched.

use crate::error::{ProbeError, ProbeResult};

/// Capacity of a [`ProbeBuffer`] in bytes.
pub const PROBE_BUFFER_CAPACITY: usize = 128;

/// Bounded append buffer for outgoing probe bytes.
///
/// # Invariant
///
/// `len() <= PROBE_BUFFER_CAPACITY` at all times.
#[derive(Clone, Copy)]
pub struct ProbeBuffer {
    buf: [u8; PROBE_BUFFER_CAPACITY],
    pos: usize,
}

impl ProbeBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buf: [0; PROBE_BUFFER_CAPACITY],
            pos: 0,
        }
    }

    /// Append `bytes` to the buffer.
    ///
    /// Returns the number of bytes written, which is always `bytes.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::BufferOverflow`] if the bytes do not fit. The
    /// buffer is not modified in that case.
    pub fn write(&mut self, bytes: &[u8]) -> ProbeResult<usize> {
        let remaining = self.remaining();
        let end = self
            .pos
            .checked_add(bytes.len())
            .filter(|end| *end <= PROBE_BUFFER_CAPACITY)
            .ok_or_else(|| ProbeError::buffer_overflow(bytes.len(), remaining))?;

        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or_else(|| ProbeError::buffer_overflow(bytes.len(), remaining))?;
        dst.copy_from_slice(bytes);
        self.pos = end;

        Ok(bytes.len())
    }

    /// Append a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::BufferOverflow`] if the buffer is full.
    pub fn write_u8(&mut self, byte: u8) -> ProbeResult<usize> {
        self.write(&[byte])
    }

    /// Append a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::BufferOverflow`] if fewer than four bytes remain.
    pub fn write_u32_be(&mut self, value: u32) -> ProbeResult<usize> {
        self.write(&value.to_be_bytes())
    }

    /// Append `text` followed by a NUL terminator as a single atomic write.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::BufferOverflow`] if the string and its terminator
    /// do not fit together.
    pub fn write_cstr(&mut self, text: &str) -> ProbeResult<usize> {
        let needed = text.len().saturating_add(1);
        if needed > self.remaining() {
            return Err(ProbeError::buffer_overflow(needed, self.remaining()));
        }
        self.write(text.as_bytes())?;
        self.write_u8(0)?;
        Ok(needed)
    }

    /// The bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.get(..self.pos).unwrap_or_default()
    }

    /// Number of bytes written so far.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.pos
    }

    /// Whether nothing has been written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Total capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        PROBE_BUFFER_CAPACITY
    }

    /// Free space left in bytes.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        PROBE_BUFFER_CAPACITY.saturating_sub(self.pos)
    }

    /// Discard the contents.
    pub fn clear(&mut self) {
        self.pos = 0;
    }
}

impl Default for ProbeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProbeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeBuffer")
            .field("len", &self.pos)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}
