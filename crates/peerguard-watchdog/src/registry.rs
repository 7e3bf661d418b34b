//! Per-session timeout registry.
//!
//! A small, fixed number of timer slots, each with a handler, an optional
//! finish time and a fired indicator. Deadlines are evaluated against the
//! registry's [`Clock`]; handlers run from [`TimerRegistry::fire_due`], which
//! the [`AlarmDriver`](crate::driver::AlarmDriver) calls on its own thread.

use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::clock::{Clock, MonotonicClock};
use crate::error::{WatchdogError, WatchdogResult};

/// Default number of timer slots per session.
pub const DEFAULT_TIMER_SLOTS: usize = 8;

/// Callback invoked when a timer expires.
pub type AlarmHandler = Arc<dyn Fn() + Send + Sync>;

/// Identifier of a registered timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(usize);

impl TimerId {
    /// Slot index inside the registry.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

struct Slot {
    handler: AlarmHandler,
    finish: Option<Instant>,
    active: bool,
    fired: bool,
}

impl Slot {
    fn is_due(&self, now: Instant) -> bool {
        self.active && self.finish.is_some_and(|finish| finish <= now)
    }
}

/// Bounded set of one-shot timers sharing one clock.
pub struct TimerRegistry {
    clock: Arc<dyn Clock>,
    capacity: usize,
    slots: Mutex<Vec<Option<Slot>>>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

impl TimerRegistry {
    /// Create a registry with [`DEFAULT_TIMER_SLOTS`] slots on the monotonic clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock), DEFAULT_TIMER_SLOTS)
    }

    /// Create a registry with an explicit clock and slot count.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            clock,
            capacity,
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently registered.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.slots.lock().iter().filter(|slot| slot.is_some()).count()
    }

    /// Current time on the registry clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Claim a free slot for `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::TimerSlotsExhausted`] if every slot is taken.
    pub fn register(&self, handler: AlarmHandler) -> WatchdogResult<TimerId> {
        let mut slots = self.slots.lock();
        let (index, free) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or_else(|| WatchdogError::timer_slots_exhausted(self.capacity))?;

        *free = Some(Slot {
            handler,
            finish: None,
            active: false,
            fired: false,
        });

        let id = TimerId(index);
        tracing::trace!(%id, "timer registered");
        Ok(id)
    }

    /// Release a slot. Pending expiry is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::UnknownTimer`] if the slot is not registered.
    pub fn unregister(&self, id: TimerId) -> WatchdogResult<()> {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(id.0)
            .filter(|slot| slot.is_some())
            .ok_or(WatchdogError::UnknownTimer(id))?;
        *slot = None;
        self.wakeup.notify_all();
        tracing::trace!(%id, "timer unregistered");
        Ok(())
    }

    /// Arm a timer to expire `delay` from now, clearing its fired indicator.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer is unknown or the deadline overflows.
    pub fn enable_after(&self, id: TimerId, delay: Duration) -> WatchdogResult<()> {
        self.lock_timer(id)?.arm(delay)?;
        Ok(())
    }

    /// Disarm a timer without touching its fired indicator.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer is unknown.
    pub fn disable(&self, id: TimerId) -> WatchdogResult<()> {
        let mut timer = self.lock_timer(id)?;
        timer.slot.active = false;
        timer.slot.finish = None;
        Ok(())
    }

    /// Read the fired indicator, optionally clearing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer is unknown.
    pub fn indicator(&self, id: TimerId, reset: bool) -> WatchdogResult<bool> {
        let mut timer = self.lock_timer(id)?;
        let fired = timer.slot.fired;
        if reset {
            timer.slot.fired = false;
        }
        Ok(fired)
    }

    /// Finish time of the last arming, if any.
    ///
    /// The finish time is kept after expiry; only [`disable`](Self::disable)
    /// clears it.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer is unknown.
    pub fn finish_time(&self, id: TimerId) -> WatchdogResult<Option<Instant>> {
        Ok(self.lock_timer(id)?.finish_time())
    }

    /// Whether the timer is armed and has not yet expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer is unknown.
    pub fn is_active(&self, id: TimerId) -> WatchdogResult<bool> {
        Ok(self.lock_timer(id)?.slot.active)
    }

    /// Earliest deadline among armed timers.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest_deadline(&self.slots.lock())
    }

    /// Expire every armed timer whose deadline has passed and run its handler.
    ///
    /// Handlers run after the registry lock is released, so they may re-arm
    /// their own timer. Returns the number of handlers invoked.
    pub fn fire_due(&self) -> usize {
        let now = self.clock.now();
        let due: Vec<(TimerId, AlarmHandler)> = {
            let mut slots = self.slots.lock();
            slots
                .iter_mut()
                .enumerate()
                .filter_map(|(index, slot)| {
                    let slot = slot.as_mut().filter(|slot| slot.is_due(now))?;
                    slot.active = false;
                    slot.fired = true;
                    Some((TimerId(index), Arc::clone(&slot.handler)))
                })
                .collect()
        };

        for (id, handler) in &due {
            tracing::trace!(%id, "timer fired");
            handler();
        }
        due.len()
    }

    /// Lock a single timer for a compound read-modify-write.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::UnknownTimer`] if the slot is not registered.
    pub fn lock_timer(&self, id: TimerId) -> WatchdogResult<TimerGuard<'_>> {
        let slot = MutexGuard::try_map(self.slots.lock(), |slots| {
            slots.get_mut(id.0).and_then(Option::as_mut)
        })
        .map_err(|_unmapped| WatchdogError::UnknownTimer(id))?;

        Ok(TimerGuard {
            slot,
            registry: self,
        })
    }

    /// Block until a timer is due. Returns `false` once the registry shuts down.
    pub(crate) fn wait_for_due(&self) -> bool {
        let mut slots = self.slots.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return false;
            }
            match earliest_deadline(&slots) {
                Some(deadline) if deadline <= self.clock.now() => return true,
                Some(deadline) => {
                    let _timed_out = self.wakeup.wait_until(&mut slots, deadline);
                }
                None => self.wakeup.wait(&mut slots),
            }
        }
    }

    /// Wake the alarm driver and make it exit.
    pub fn shutdown(&self) {
        let slots = self.slots.lock();
        self.shutdown.store(true, Ordering::Release);
        self.wakeup.notify_all();
        drop(slots);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("clock", &self.clock)
            .field("capacity", &self.capacity)
            .field("registered", &self.registered())
            .field("shutdown", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

fn earliest_deadline(slots: &[Option<Slot>]) -> Option<Instant> {
    slots
        .iter()
        .flatten()
        .filter(|slot| slot.active)
        .filter_map(|slot| slot.finish)
        .min()
}

/// Exclusive access to one timer slot.
///
/// Holds the registry lock; keep it short and never run handlers under it.
pub struct TimerGuard<'a> {
    slot: MappedMutexGuard<'a, Slot>,
    registry: &'a TimerRegistry,
}

impl TimerGuard<'_> {
    /// Whether the timer expired since it was last armed.
    #[must_use]
    pub fn fired(&self) -> bool {
        self.slot.fired
    }

    /// Finish time of the last arming.
    #[must_use]
    pub fn finish_time(&self) -> Option<Instant> {
        self.slot.finish
    }

    /// Current time on the registry clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.registry.clock.now()
    }

    /// Arm the timer for `delay` from now and clear the fired indicator.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::DeadlineOverflow`] if the deadline cannot be
    /// represented.
    pub fn arm(&mut self, delay: Duration) -> WatchdogResult<Instant> {
        let finish = self
            .now()
            .checked_add(delay)
            .ok_or(WatchdogError::DeadlineOverflow(delay))?;
        self.slot.finish = Some(finish);
        self.slot.active = true;
        self.slot.fired = false;
        self.registry.wakeup.notify_all();
        Ok(finish)
    }
}

impl fmt::Debug for TimerGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerGuard")
            .field("finish", &self.slot.finish)
            .field("active", &self.slot.active)
            .field("fired", &self.slot.fired)
            .finish()
    }
}
