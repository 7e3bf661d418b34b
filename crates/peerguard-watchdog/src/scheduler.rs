//! The session's single liveness timer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::WatchdogResult;
use crate::registry::{AlarmHandler, TimerId, TimerRegistry};

/// Owns one registry slot and keeps it armed without double-scheduling.
///
/// The slot is released when the scheduler is dropped.
#[derive(Debug)]
pub struct TimerScheduler {
    registry: Arc<TimerRegistry>,
    id: TimerId,
}

impl TimerScheduler {
    /// Claim a slot in `registry` for `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::TimerSlotsExhausted`](crate::WatchdogError::TimerSlotsExhausted)
    /// if no slot is free.
    pub fn register(registry: Arc<TimerRegistry>, handler: AlarmHandler) -> WatchdogResult<Self> {
        let id = registry.register(handler)?;
        Ok(Self { registry, id })
    }

    /// Arm the timer for `interval` from now unless it is already pending.
    ///
    /// A timer that has fired since it was last armed is always re-armed.
    /// Otherwise a recorded finish time in the future means a check is
    /// already scheduled and nothing changes. Returns whether the timer was
    /// armed by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot vanished or the deadline overflows.
    pub fn ensure_scheduled(&self, interval: Duration) -> WatchdogResult<bool> {
        let mut timer = self.registry.lock_timer(self.id)?;

        if !timer.fired()
            && let Some(finish) = timer.finish_time()
            && finish > timer.now()
        {
            return Ok(false);
        }

        let finish = timer.arm(interval)?;
        drop(timer);
        tracing::debug!(id = %self.id, ?interval, ?finish, "liveness check scheduled");
        Ok(true)
    }

    /// Registry slot in use.
    #[must_use]
    pub fn id(&self) -> TimerId {
        self.id
    }

    /// Whether the timer has fired since it was last armed.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot vanished.
    pub fn has_fired(&self) -> WatchdogResult<bool> {
        self.registry.indicator(self.id, false)
    }

    /// Finish time of the last arming.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot vanished.
    pub fn finish_time(&self) -> WatchdogResult<Option<Instant>> {
        self.registry.finish_time(self.id)
    }

    /// Stop the pending check, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot vanished.
    pub fn cancel(&self) -> WatchdogResult<()> {
        self.registry.disable(self.id)
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.registry.unregister(self.id) {
            tracing::debug!(id = %self.id, error = %e, "timer already released");
        }
    }
}
