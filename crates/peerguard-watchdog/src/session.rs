//! The peer connection as seen by the watchdog.
//!
//! The worker owns the connection; the watchdog only needs to know its
//! framing and to write probes to it.

use std::io;
use std::net::TcpStream;

use peerguard_probe::{FramingVariant, ProbeSink};

/// A peer connection the watchdog can probe.
pub trait PeerSession: ProbeSink {
    /// Framing negotiated with the peer.
    fn framing(&self) -> FramingVariant;
}

/// Outcome of the session's authentication exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// Credentials were accepted.
    Ok,
    /// Credentials were rejected; the session is about to close.
    Failed,
}

/// Kind of unit of work the worker is about to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Ordinary work that may run for a long time.
    Statement,
    /// Administrative command expected to finish immediately.
    Utility,
}

/// [`PeerSession`] over a plain TCP connection.
///
/// Probe writes are single `send(2)` calls with `MSG_DONTWAIT`, so the
/// socket's own blocking mode and timeouts stay untouched and the worker may
/// keep writing replies through its clones of the stream.
#[derive(Debug)]
pub struct TcpPeerSession {
    stream: TcpStream,
    framing: FramingVariant,
    encrypted: bool,
}

impl TcpPeerSession {
    /// Wrap `stream`.
    #[must_use]
    pub fn new(stream: TcpStream, framing: FramingVariant) -> Self {
        Self {
            stream,
            framing,
            encrypted: false,
        }
    }

    /// Wrap `stream` for a peer that announced `protocol_version`.
    #[must_use]
    pub fn from_protocol_version(stream: TcpStream, protocol_version: u32) -> Self {
        Self::new(stream, FramingVariant::from_protocol_version(protocol_version))
    }

    /// Mark the connection as carrying transport encryption.
    #[must_use]
    pub fn with_encryption(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    /// Underlying stream.
    #[must_use]
    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }
}

impl ProbeSink for TcpPeerSession {
    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    #[cfg(unix)]
    fn write_nonblocking(&self, buf: &[u8]) -> io::Result<usize> {
        use nix::sys::socket::send;
        use std::os::fd::AsRawFd;

        send(self.stream.as_raw_fd(), buf, send_flags()).map_err(io::Error::from)
    }

    /// Without a per-call non-blocking send the probe is never attempted.
    #[cfg(not(unix))]
    fn write_nonblocking(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::WouldBlock))
    }
}

#[cfg(unix)]
fn send_flags() -> nix::sys::socket::MsgFlags {
    use nix::sys::socket::MsgFlags;

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    {
        MsgFlags::MSG_DONTWAIT | MsgFlags::MSG_NOSIGNAL
    }
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        MsgFlags::MSG_DONTWAIT
    }
}

impl PeerSession for TcpPeerSession {
    fn framing(&self) -> FramingVariant {
        self.framing
    }
}
