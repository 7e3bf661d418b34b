//! Probe frame encoding for the two supported framing variants.
//!
//! The probe has to look like ordinary asynchronous chatter that a conforming
//! peer already tolerates mid-session. It never asks for a reply.
//!
//! ## Modern framing
//!
//! ```text
//! +-----+----------------+-----------------------+------------------------+
//! | 'S' | len: u32 (BE)  | name bytes ... \0     | value bytes ... \0     |
//! +-----+----------------+-----------------------+------------------------+
//!         len counts itself plus both terminated strings, not the tag
//! ```
//!
//! ## Legacy framing
//!
//! ```text
//! +-----+-----------------------------+
//! | 'N' | message bytes ... \0        |
//! +-----+-----------------------------+
//! ```

use crate::buffer::ProbeBuffer;
use crate::error::{ProbeError, ProbeResult};

/// Message tag of a parameter status report (modern framing).
pub const PARAMETER_STATUS_TAG: u8 = b'S';

/// Message tag of a free-form notice (legacy framing).
pub const NOTICE_TAG: u8 = b'N';

/// Reserved parameter name carried by the modern probe.
pub const PROBE_PARAMETER_NAME: &str = "peerguard_probe_name";

/// Reserved parameter value carried by the modern probe.
pub const PROBE_PARAMETER_VALUE: &str = "peerguard_probe_value";

/// Notice text carried by the legacy probe.
pub const PROBE_NOTICE_MESSAGE: &str = "keep alive checking from peerguard";

/// Size of the length field in modern framing.
pub const LENGTH_FIELD_SIZE: usize = 4;

/// First protocol major version that uses length-prefixed framing.
pub const MODERN_PROTOCOL_MAJOR: u32 = 3;

/// Wire framing negotiated for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FramingVariant {
    /// Terminator-delimited messages without a length prefix.
    Legacy,
    /// Length-prefixed messages.
    Modern,
}

impl FramingVariant {
    /// Derive the framing from a packed protocol version.
    ///
    /// The major version lives in the upper 16 bits, the minor version in the
    /// lower 16 bits.
    #[must_use]
    pub const fn from_protocol_version(version: u32) -> Self {
        if protocol_major(version) >= MODERN_PROTOCOL_MAJOR {
            Self::Modern
        } else {
            Self::Legacy
        }
    }

    /// Get the framing as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Modern => "modern",
        }
    }
}

impl std::fmt::Display for FramingVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Major version of a packed protocol version.
#[must_use]
pub const fn protocol_major(version: u32) -> u32 {
    version >> 16
}

/// Pack a protocol version from its major and minor parts.
#[must_use]
pub const fn protocol_version(major: u16, minor: u16) -> u32 {
    ((major as u32) << 16) | minor as u32
}

/// Stateless encoder for liveness probes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeEncoder;

impl ProbeEncoder {
    /// Create a new encoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode the probe for `framing` into a fresh buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::BufferOverflow`] if the frame does not fit the
    /// fixed buffer. The payloads are constant, so this only happens if they
    /// grow past the buffer capacity.
    pub fn encode(&self, framing: FramingVariant) -> ProbeResult<ProbeBuffer> {
        let mut buf = ProbeBuffer::new();
        match framing {
            FramingVariant::Modern => {
                encode_parameter_status(&mut buf, PROBE_PARAMETER_NAME, PROBE_PARAMETER_VALUE)?;
            }
            FramingVariant::Legacy => encode_notice(&mut buf, PROBE_NOTICE_MESSAGE)?,
        }
        Ok(buf)
    }
}

/// Append a parameter status frame for `name`/`value` to `buf`.
///
/// # Errors
///
/// Returns an error if the frame does not fit in `buf` or its length does not
/// fit the length field.
pub fn encode_parameter_status(buf: &mut ProbeBuffer, name: &str, value: &str) -> ProbeResult<()> {
    let frame_len = LENGTH_FIELD_SIZE
        .saturating_add(name.len())
        .saturating_add(1)
        .saturating_add(value.len())
        .saturating_add(1);
    let declared = u32::try_from(frame_len).map_err(|_overflow| ProbeError::FrameTooLong(frame_len))?;

    // The tag is not covered by the length field.
    let total = frame_len.saturating_add(1);
    if total > buf.remaining() {
        return Err(ProbeError::buffer_overflow(total, buf.remaining()));
    }

    buf.write_u8(PARAMETER_STATUS_TAG)?;
    buf.write_u32_be(declared)?;
    buf.write_cstr(name)?;
    buf.write_cstr(value)?;
    Ok(())
}

/// Append a legacy notice frame carrying `message` to `buf`.
///
/// # Errors
///
/// Returns an error if the frame does not fit in `buf`.
pub fn encode_notice(buf: &mut ProbeBuffer, message: &str) -> ProbeResult<()> {
    let total = message.len().saturating_add(2);
    if total > buf.remaining() {
        return Err(ProbeError::buffer_overflow(total, buf.remaining()));
    }

    buf.write_u8(NOTICE_TAG)?;
    buf.write_cstr(message)?;
    Ok(())
}
