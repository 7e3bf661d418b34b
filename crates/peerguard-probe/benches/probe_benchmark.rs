//! Performance benchmarks for the probe path.

use criterion::{Criterion, criterion_group, criterion_main};
use peerguard_probe::prelude::*;
use std::hint::black_box;
use std::io;

/// Sink that accepts everything without touching a socket.
struct NullSink;

impl ProbeSink for NullSink {
    fn is_encrypted(&self) -> bool {
        false
    }

    fn write_nonblocking(&self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }
}

fn bench_encode(c: &mut Criterion) {
    let encoder = ProbeEncoder::new();

    c.bench_function("encode_modern", |b| {
        b.iter(|| encoder.encode(black_box(FramingVariant::Modern)));
    });

    c.bench_function("encode_legacy", |b| {
        b.iter(|| encoder.encode(black_box(FramingVariant::Legacy)));
    });
}

fn bench_encode_and_flush(c: &mut Criterion) {
    let encoder = ProbeEncoder::new();
    let flusher = SocketFlusher::new();
    let sink = NullSink;

    c.bench_function("encode_and_flush_modern", |b| {
        b.iter(|| {
            encoder
                .encode(black_box(FramingVariant::Modern))
                .map(|probe| flusher.flush(&probe, &sink))
        });
    });
}

criterion_group!(benches, bench_encode, bench_encode_and_flush);
criterion_main!(benches);
