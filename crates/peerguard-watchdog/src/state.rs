//! Watchdog controller state machine.
//!
//! ```text
//! Idle ──begin_probe()──► Probing ──finish_probe()──► Idle
//!  ▲                         │
//!  │                   request_cancel()
//!  │                         ▼
//!  └──────reset()───── CancelRequested
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{WatchdogError, WatchdogResult};

/// Controller state for the current unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum WatchdogState {
    /// No probe in flight and no cancellation requested.
    #[default]
    Idle = 0,
    /// An alarm callback is probing the peer.
    Probing = 1,
    /// The peer was found dead; terminal until reset.
    CancelRequested = 2,
}

impl WatchdogState {
    /// Convert from the raw discriminant.
    #[must_use]
    pub fn from_raw(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Probing),
            2 => Some(Self::CancelRequested),
            _ => None,
        }
    }

    /// Convert to the raw discriminant.
    #[must_use]
    pub fn to_raw(self) -> u8 {
        self as u8
    }

    /// Whether the state only leaves through [`StateCell::reset`].
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CancelRequested)
    }

    /// Get the state as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Probing => "Probing",
            Self::CancelRequested => "CancelRequested",
        }
    }
}

impl std::fmt::Display for WatchdogState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free holder of a [`WatchdogState`].
#[derive(Debug, Default)]
pub struct StateCell {
    raw: AtomicU8,
}

impl StateCell {
    /// Create a cell in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn get(&self) -> WatchdogState {
        WatchdogState::from_raw(self.raw.load(Ordering::Acquire)).unwrap_or_default()
    }

    fn transition(&self, from: WatchdogState, to: WatchdogState) -> WatchdogResult<()> {
        self.raw
            .compare_exchange(from.to_raw(), to.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|current| {
                let current = WatchdogState::from_raw(current).unwrap_or_default();
                WatchdogError::invalid_transition(current.as_str(), to.as_str())
            })
    }

    /// `Idle` to `Probing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state is not `Idle`.
    pub fn begin_probe(&self) -> WatchdogResult<()> {
        self.transition(WatchdogState::Idle, WatchdogState::Probing)
    }

    /// `Probing` back to `Idle`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state is not `Probing`.
    pub fn finish_probe(&self) -> WatchdogResult<()> {
        self.transition(WatchdogState::Probing, WatchdogState::Idle)
    }

    /// `Probing` to `CancelRequested`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state is not `Probing`.
    pub fn request_cancel(&self) -> WatchdogResult<()> {
        self.transition(WatchdogState::Probing, WatchdogState::CancelRequested)
    }

    /// Return to `Idle` for the next unit of work. Returns the previous state.
    pub fn reset(&self) -> WatchdogState {
        WatchdogState::from_raw(self.raw.swap(WatchdogState::Idle.to_raw(), Ordering::AcqRel))
            .unwrap_or_default()
    }
}
