//! Draining a probe buffer onto the peer socket.
//!
//! The flusher runs on the alarm path, so it never waits: a full socket buffer
//! is reported as [`FlushOutcome::WouldBlock`] and left for the next cycle.
//! Only a hard write error is evidence that the peer is gone.

use std::io;

use crate::buffer::ProbeBuffer;

/// Write side of a peer connection, as seen by the probe.
pub trait ProbeSink: Send + Sync {
    /// Whether the connection is wrapped in transport encryption.
    ///
    /// Probes are never written to encrypted connections.
    fn is_encrypted(&self) -> bool;

    /// Attempt a single write of `buf` without blocking.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error. `WouldBlock` and `Interrupted` are handled
    /// by the flusher; anything else is treated as a dead peer.
    fn write_nonblocking(&self, buf: &[u8]) -> io::Result<usize>;
}

impl<T: ProbeSink + ?Sized> ProbeSink for std::sync::Arc<T> {
    fn is_encrypted(&self) -> bool {
        (**self).is_encrypted()
    }

    fn write_nonblocking(&self, buf: &[u8]) -> io::Result<usize> {
        (**self).write_nonblocking(buf)
    }
}

/// Health verdict of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushOutcome {
    /// Every byte was handed to the socket.
    Ok,
    /// The socket could not take the bytes right now, or the probe was not
    /// attempted. Not a peer failure.
    WouldBlock,
    /// The write failed; the peer is presumed gone.
    Failed,
}

impl FlushOutcome {
    /// Whether this outcome should drive cancellation.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Get the outcome as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::WouldBlock => "would_block",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FlushOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drains a [`ProbeBuffer`] to a [`ProbeSink`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketFlusher;

impl SocketFlusher {
    /// Create a new flusher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Write the whole buffer to `sink` and classify the result.
    ///
    /// Partial writes are continued from the current offset and interrupted
    /// writes are retried. A would-block after a partial send still reports
    /// `WouldBlock`: the unsent tail is dropped, leaving a truncated frame
    /// on the wire that desynchronises the peer's framing. This only happens
    /// when the socket buffer fills mid-frame, and the peer cannot be told
    /// without blocking.
    pub fn flush<S: ProbeSink + ?Sized>(&self, buffer: &ProbeBuffer, sink: &S) -> FlushOutcome {
        let bytes = buffer.as_bytes();
        if bytes.is_empty() {
            return FlushOutcome::Ok;
        }

        if sink.is_encrypted() {
            tracing::debug!("liveness probe is not supported over an encrypted connection");
            return FlushOutcome::WouldBlock;
        }

        let mut offset = 0usize;
        loop {
            let Some(pending) = bytes.get(offset..) else {
                return FlushOutcome::Failed;
            };

            match sink.write_nonblocking(pending) {
                Ok(0) => {
                    tracing::warn!(offset, "liveness probe write accepted no bytes");
                    return FlushOutcome::Failed;
                }
                Ok(written) if written >= pending.len() => {
                    if written > pending.len() {
                        tracing::warn!(
                            written,
                            expected = pending.len(),
                            "liveness probe write reported more bytes than requested"
                        );
                        return FlushOutcome::Failed;
                    }
                    return FlushOutcome::Ok;
                }
                Ok(written) => {
                    offset = offset.saturating_add(written);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    return FlushOutcome::WouldBlock;
                }
                Err(err) => {
                    tracing::debug!(error = %err, "liveness probe write failed");
                    return FlushOutcome::Failed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{FramingVariant, ProbeEncoder};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Sink that replays a script of write results and records accepted bytes.
    struct ScriptedSink {
        encrypted: bool,
        script: Mutex<VecDeque<io::Result<usize>>>,
        written: Mutex<Vec<u8>>,
        calls: Mutex<usize>,
    }

    impl ScriptedSink {
        fn new(script: Vec<io::Result<usize>>) -> Self {
            Self {
                encrypted: false,
                script: Mutex::new(script.into()),
                written: Mutex::new(Vec::new()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl ProbeSink for ScriptedSink {
        fn is_encrypted(&self) -> bool {
            self.encrypted
        }

        fn write_nonblocking(&self, buf: &[u8]) -> io::Result<usize> {
            *self.calls.lock().unwrap() += 1;
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(buf.len()));
            if let Ok(n) = next {
                let n = n.min(buf.len());
                self.written.lock().unwrap().extend_from_slice(&buf[..n]);
            }
            next
        }
    }

    fn probe() -> ProbeBuffer {
        ProbeEncoder::new().encode(FramingVariant::Modern).unwrap()
    }

    #[test]
    fn test_full_write_is_ok() {
        let sink = ScriptedSink::new(vec![]);
        let buf = probe();
        assert_eq!(SocketFlusher::new().flush(&buf, &sink), FlushOutcome::Ok);
        assert_eq!(&*sink.written.lock().unwrap(), buf.as_bytes());
    }

    #[test]
    fn test_partial_writes_are_resumed() {
        let sink = ScriptedSink::new(vec![Ok(3), Ok(5)]);
        let buf = probe();
        assert_eq!(SocketFlusher::new().flush(&buf, &sink), FlushOutcome::Ok);
        assert_eq!(sink.calls(), 3);
        assert_eq!(&*sink.written.lock().unwrap(), buf.as_bytes());
    }

    #[test]
    fn test_interrupted_write_is_retried() {
        let sink = ScriptedSink::new(vec![
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Err(io::Error::from(io::ErrorKind::Interrupted)),
        ]);
        assert_eq!(SocketFlusher::new().flush(&probe(), &sink), FlushOutcome::Ok);
        assert_eq!(sink.calls(), 3);
    }

    #[test]
    fn test_would_block_is_backpressure() {
        let sink = ScriptedSink::new(vec![Err(io::Error::from(io::ErrorKind::WouldBlock))]);
        assert_eq!(
            SocketFlusher::new().flush(&probe(), &sink),
            FlushOutcome::WouldBlock
        );
    }

    #[test]
    fn test_would_block_after_partial_write_drops_tail() {
        let sink = ScriptedSink::new(vec![
            Ok(3),
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
        ]);
        let buf = probe();
        assert_eq!(
            SocketFlusher::new().flush(&buf, &sink),
            FlushOutcome::WouldBlock
        );
        assert_eq!(sink.calls(), 2);
        assert_eq!(&*sink.written.lock().unwrap(), &buf.as_bytes()[..3]);
    }

    #[test]
    fn test_broken_pipe_is_failure() {
        let sink = ScriptedSink::new(vec![Err(io::Error::from(io::ErrorKind::BrokenPipe))]);
        let outcome = SocketFlusher::new().flush(&probe(), &sink);
        assert_eq!(outcome, FlushOutcome::Failed);
        assert!(outcome.is_failure());
    }

    #[test]
    fn test_zero_byte_write_is_failure() {
        let sink = ScriptedSink::new(vec![Ok(0)]);
        assert_eq!(SocketFlusher::new().flush(&probe(), &sink), FlushOutcome::Failed);
    }

    #[test]
    fn test_encrypted_session_is_skipped() {
        let mut sink = ScriptedSink::new(vec![Err(io::Error::from(io::ErrorKind::BrokenPipe))]);
        sink.encrypted = true;
        assert_eq!(
            SocketFlusher::new().flush(&probe(), &sink),
            FlushOutcome::WouldBlock
        );
        assert_eq!(sink.calls(), 0);
    }

    #[test]
    fn test_empty_buffer_is_ok_without_writing() {
        let sink = ScriptedSink::new(vec![]);
        assert_eq!(
            SocketFlusher::new().flush(&ProbeBuffer::new(), &sink),
            FlushOutcome::Ok
        );
        assert_eq!(sink.calls(), 0);
    }
}
