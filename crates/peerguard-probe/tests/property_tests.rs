//! Property-based tests for probe framing and flush classification.

use peerguard_probe::encoder::{
    LENGTH_FIELD_SIZE, PROBE_NOTICE_MESSAGE, PROBE_PARAMETER_NAME, PROBE_PARAMETER_VALUE,
    encode_notice, encode_parameter_status, protocol_version,
};
use peerguard_probe::prelude::*;
use proptest::prelude::*;
use std::io;
use std::sync::Mutex;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// A parameter status message as a length-prefixed reader sees it.
#[derive(Debug)]
struct ParsedParameterStatus {
    declared_len: usize,
    name: String,
    value: String,
}

/// Minimal length-prefixed reader: tag, big-endian length, then a body whose
/// size is the declared length minus the length field.
fn parse_parameter_status(bytes: &[u8]) -> Result<ParsedParameterStatus, String> {
    let (&tag, rest) = bytes.split_first().ok_or("empty frame")?;
    if tag != b'S' {
        return Err(format!("unexpected tag {tag:#x}"));
    }
    let len_bytes: [u8; 4] = rest
        .get(..4)
        .ok_or("short length field")?
        .try_into()
        .map_err(|_e| "short length field")?;
    let declared_len = u32::from_be_bytes(len_bytes) as usize;
    let body = rest
        .get(4..declared_len)
        .ok_or("declared length exceeds frame")?;
    if rest.len() != declared_len {
        return Err("trailing bytes after frame".to_string());
    }

    let mut parts = body.split(|b| *b == 0);
    let name = parts.next().ok_or("missing name")?;
    let value = parts.next().ok_or("missing value")?;
    if parts.next() != Some(&[][..]) || parts.next().is_some() {
        return Err("body is not two terminated strings".to_string());
    }

    Ok(ParsedParameterStatus {
        declared_len,
        name: String::from_utf8(name.to_vec()).map_err(|e| e.to_string())?,
        value: String::from_utf8(value.to_vec()).map_err(|e| e.to_string())?,
    })
}

#[test]
fn test_modern_probe_parses_as_parameter_status() -> TestResult {
    let probe = ProbeEncoder::new().encode(FramingVariant::Modern)?;
    let parsed = parse_parameter_status(probe.as_bytes())?;

    assert_eq!(parsed.declared_len, probe.len() - 1);
    assert_eq!(parsed.name, PROBE_PARAMETER_NAME);
    assert_eq!(parsed.value, PROBE_PARAMETER_VALUE);
    Ok(())
}

#[test]
fn test_legacy_probe_has_single_trailing_terminator() -> TestResult {
    let probe = ProbeEncoder::new().encode(FramingVariant::Legacy)?;
    let bytes = probe.as_bytes();

    assert_eq!(bytes.first(), Some(&b'N'));
    assert_eq!(bytes.iter().filter(|b| **b == 0).count(), 1);
    assert_eq!(bytes.last(), Some(&0));
    assert_eq!(bytes.len(), PROBE_NOTICE_MESSAGE.len() + 2);
    Ok(())
}

#[test]
fn test_probes_fit_the_buffer() -> TestResult {
    for framing in [FramingVariant::Legacy, FramingVariant::Modern] {
        let probe = ProbeEncoder::new().encode(framing)?;
        assert!(!probe.is_empty());
        assert!(probe.len() <= PROBE_BUFFER_CAPACITY);
    }
    Ok(())
}

/// Sink that always reports the same error kind.
struct StuckSink {
    kind: io::ErrorKind,
    calls: Mutex<u64>,
}

impl ProbeSink for StuckSink {
    fn is_encrypted(&self) -> bool {
        false
    }

    fn write_nonblocking(&self, _buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        Err(io::Error::from(self.kind))
    }
}

/// Sink that accepts at most `chunk` bytes per write.
struct ChunkedSink {
    chunk: usize,
    received: Mutex<Vec<u8>>,
}

impl ProbeSink for ChunkedSink {
    fn is_encrypted(&self) -> bool {
        false
    }

    fn write_nonblocking(&self, buf: &[u8]) -> io::Result<usize> {
        let n = self.chunk.min(buf.len());
        if let Ok(mut received) = self.received.lock() {
            received.extend_from_slice(&buf[..n]);
        }
        Ok(n)
    }
}

proptest! {
    #[test]
    fn test_parameter_status_length_matches_encoding(
        name in "[a-z_]{1,40}",
        value in "[a-z0-9_]{0,40}",
    ) {
        let mut buf = ProbeBuffer::new();
        encode_parameter_status(&mut buf, &name, &value).unwrap();

        let parsed = parse_parameter_status(buf.as_bytes()).unwrap();
        prop_assert_eq!(parsed.declared_len, buf.len() - 1);
        prop_assert_eq!(
            parsed.declared_len,
            LENGTH_FIELD_SIZE + name.len() + 1 + value.len() + 1
        );
        prop_assert_eq!(parsed.name, name);
        prop_assert_eq!(parsed.value, value);
    }

    #[test]
    fn test_notice_has_no_embedded_terminator(message in "[ -~]{0,100}") {
        let mut buf = ProbeBuffer::new();
        encode_notice(&mut buf, &message).unwrap();

        let bytes = buf.as_bytes();
        prop_assert_eq!(bytes.iter().filter(|b| **b == 0).count(), 1);
        prop_assert_eq!(bytes.last(), Some(&0));
    }

    #[test]
    fn test_oversized_frames_never_partially_write(extra in 0usize..64) {
        let mut buf = ProbeBuffer::new();
        let message = "m".repeat(PROBE_BUFFER_CAPACITY - 1 + extra);
        prop_assert!(encode_notice(&mut buf, &message).is_err());
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn test_would_block_is_never_failure(attempts in 1usize..200) {
        let sink = StuckSink { kind: io::ErrorKind::WouldBlock, calls: Mutex::new(0) };
        let probe = ProbeEncoder::new().encode(FramingVariant::Modern).unwrap();
        let flusher = SocketFlusher::new();

        for _ in 0..attempts {
            let outcome = flusher.flush(&probe, &sink);
            prop_assert_eq!(outcome, FlushOutcome::WouldBlock);
            prop_assert!(!outcome.is_failure());
        }
        prop_assert_eq!(*sink.calls.lock().unwrap(), attempts as u64);
    }

    #[test]
    fn test_chunked_writes_deliver_whole_frame(chunk in 1usize..64, modern in any::<bool>()) {
        let framing = if modern { FramingVariant::Modern } else { FramingVariant::Legacy };
        let probe = ProbeEncoder::new().encode(framing).unwrap();
        let sink = ChunkedSink { chunk, received: Mutex::new(Vec::new()) };

        prop_assert_eq!(SocketFlusher::new().flush(&probe, &sink), FlushOutcome::Ok);
        prop_assert_eq!(&*sink.received.lock().unwrap(), probe.as_bytes());
    }

    #[test]
    fn test_framing_follows_major_version(major in 0u16..10, minor in any::<u16>()) {
        let framing = FramingVariant::from_protocol_version(protocol_version(major, minor));
        if major >= 3 {
            prop_assert_eq!(framing, FramingVariant::Modern);
        } else {
            prop_assert_eq!(framing, FramingVariant::Legacy);
        }
    }
}
