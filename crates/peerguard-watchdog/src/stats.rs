//! Probe statistics.
//!
//! Counters are bumped from the alarm path, so they are plain relaxed atomics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use peerguard_probe::FlushOutcome;

/// Point-in-time copy of [`ProbeStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Probes written in full.
    pub probes_sent: u64,
    /// Probes the socket could not take, or that were not attempted.
    pub would_block: u64,
    /// Probes whose write failed.
    pub failures: u64,
    /// Cancellations dispatched.
    pub cancellations: u64,
    /// Times the timer was armed.
    pub rearms: u64,
    /// Alarm callbacks that did not probe.
    pub skipped: u64,
    /// Probe frames that could not be encoded.
    pub encode_errors: u64,
}

impl StatsSnapshot {
    /// Number of probe attempts that reached the flusher.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.probes_sent
            .saturating_add(self.would_block)
            .saturating_add(self.failures)
    }
}

/// Per-session probe counters.
#[derive(Debug, Default)]
pub struct ProbeStats {
    probes_sent: AtomicU64,
    would_block: AtomicU64,
    failures: AtomicU64,
    cancellations: AtomicU64,
    rearms: AtomicU64,
    skipped: AtomicU64,
    encode_errors: AtomicU64,
}

impl ProbeStats {
    /// Create zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            probes_sent: AtomicU64::new(0),
            would_block: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
            rearms: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            encode_errors: AtomicU64::new(0),
        }
    }

    /// Count a flush result.
    #[inline]
    pub fn record_outcome(&self, outcome: FlushOutcome) {
        let counter = match outcome {
            FlushOutcome::Ok => &self.probes_sent,
            FlushOutcome::WouldBlock => &self.would_block,
            FlushOutcome::Failed => &self.failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dispatched cancellation.
    #[inline]
    pub fn inc_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a timer arming.
    #[inline]
    pub fn inc_rearm(&self) {
        self.rearms.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an alarm that did not probe.
    #[inline]
    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an encoding failure.
    #[inline]
    pub fn inc_encode_error(&self) {
        self.encode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            would_block: self.would_block.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            rearms: self.rearms.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            encode_errors: self.encode_errors.load(Ordering::Relaxed),
        }
    }
}
