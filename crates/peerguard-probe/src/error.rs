//! Error types for probe assembly.

use thiserror::Error;

/// Errors that can occur while assembling a probe frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// A write would have moved the cursor past the buffer capacity.
    #[error("Probe buffer overflow: {requested} bytes requested, {remaining} remaining")]
    BufferOverflow {
        /// Number of bytes the caller tried to append.
        requested: usize,
        /// Free space left in the buffer at the time of the write.
        remaining: usize,
    },

    /// The frame length does not fit the 4-byte length field.
    #[error("Probe frame length {0} exceeds the length field")]
    FrameTooLong(usize),
}

impl ProbeError {
    /// Create a buffer overflow error.
    #[must_use]
    pub fn buffer_overflow(requested: usize, remaining: usize) -> Self {
        Self::BufferOverflow {
            requested,
            remaining,
        }
    }
}

/// A specialized `Result` type for probe operations.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;
