//! Error types for the watchdog.
//!
//! Nothing here is ever reported to the peer. Errors flow to the worker that
//! hosts the watchdog, which decides whether they are fatal.

use std::time::Duration;

use peerguard_probe::ProbeError;
use thiserror::Error;

use crate::registry::TimerId;

/// Errors that can occur during watchdog operations.
#[derive(Debug, Clone, Error)]
pub enum WatchdogError {
    /// Every timer slot in the registry is taken.
    ///
    /// The watchdog must not run without its timer, so hosts treat this as
    /// fatal for the session.
    #[error("No free timer slot (capacity {capacity})")]
    TimerSlotsExhausted {
        /// Number of slots the registry was created with.
        capacity: usize,
    },

    /// The timer id does not belong to a live registration.
    #[error("Timer not registered: {0}")]
    UnknownTimer(TimerId),

    /// A deadline could not be represented by the monotonic clock.
    #[error("Timer deadline overflow for interval {0:?}")]
    DeadlineOverflow(Duration),

    /// A state machine transition is not allowed from the current state.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        /// State the machine was in.
        from: &'static str,
        /// State that was requested.
        to: &'static str,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The alarm driver thread could not be started.
    #[error("Failed to start alarm driver: {0}")]
    DriverSpawnFailed(String),

    /// The probe frame could not be assembled.
    #[error("Probe encoding failed: {0}")]
    Probe(#[from] ProbeError),
}

impl WatchdogError {
    /// Create a timer slot exhaustion error.
    #[must_use]
    pub fn timer_slots_exhausted(capacity: usize) -> Self {
        Self::TimerSlotsExhausted { capacity }
    }

    /// Create an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: &'static str, to: &'static str) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Whether the error must take the session down.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::TimerSlotsExhausted { .. } | Self::DriverSpawnFailed(_)
        )
    }
}

/// A specialized `Result` type for watchdog operations.
pub type WatchdogResult<T> = std::result::Result<T, WatchdogError>;
