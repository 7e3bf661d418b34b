//! Per-session liveness watchdog.
//!
//! The controller is the session context every watchdog operation runs
//! against: it owns the session's timer slot, its probe state machine and its
//! statistics. The worker drives it through two hooks,
//! [`on_authenticated`](WatchdogController::on_authenticated) and
//! [`on_unit_of_work`](WatchdogController::on_unit_of_work); the alarm driver
//! drives it through [`on_alarm`](WatchdogController::on_alarm).
//!
//! At most one probe cycle runs at a time. A nested or concurrent alarm that
//! finds a cycle in flight returns immediately.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use peerguard_probe::{FlushOutcome, ProbeEncoder, SocketFlusher};

use crate::cancel::{CancellationDispatcher, TokenDispatcher};
use crate::config::WatchdogConfig;
use crate::error::WatchdogResult;
use crate::interrupt::CancelToken;
use crate::registry::{AlarmHandler, TimerId, TimerRegistry};
use crate::scheduler::TimerScheduler;
use crate::session::{AuthStatus, CommandKind, PeerSession};
use crate::state::{StateCell, WatchdogState};
use crate::stats::{ProbeStats, StatsSnapshot};

/// Why an alarm did not probe the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The watchdog is turned off for this session.
    Disabled,
    /// Another interrupt is already pending on the session.
    InterruptPending,
    /// A probe cycle is already running.
    InFlight,
    /// Cancellation was requested and the worker has not reset yet.
    CancelRequested,
    /// The probe frame could not be built.
    EncodeFailed,
}

impl SkipReason {
    /// Get the reason as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::InterruptPending => "interrupt_pending",
            Self::InFlight => "in_flight",
            Self::CancelRequested => "cancel_requested",
            Self::EncodeFailed => "encode_failed",
        }
    }
}

/// Result of one alarm callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCycle {
    /// No probe was written.
    Skipped(SkipReason),
    /// The probe was attempted and the peer is not known to be dead.
    Delivered(FlushOutcome),
    /// The probe failed and cancellation was dispatched.
    Cancelled,
}

impl ProbeCycle {
    /// Whether this cycle dispatched cancellation.
    #[must_use]
    pub fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Liveness watchdog for one peer session.
pub struct WatchdogController {
    self_ref: Weak<Self>,
    config: RwLock<WatchdogConfig>,
    session: Arc<dyn PeerSession>,
    registry: Arc<TimerRegistry>,
    scheduler: OnceLock<TimerScheduler>,
    registration: Mutex<()>,
    probe_guard: Mutex<()>,
    token: CancelToken,
    dispatcher: Arc<dyn CancellationDispatcher>,
    state: StateCell,
    stats: ProbeStats,
    encoder: ProbeEncoder,
    flusher: SocketFlusher,
}

impl WatchdogController {
    /// Start building a controller for `session`.
    #[must_use]
    pub fn builder(session: Arc<dyn PeerSession>) -> WatchdogControllerBuilder {
        WatchdogControllerBuilder {
            session,
            config: WatchdogConfig::default(),
            registry: None,
            token: None,
            dispatcher: None,
        }
    }

    /// Session-authentication hook.
    ///
    /// On success, claims the session's timer slot. Calling it again is a
    /// no-op. Nothing is armed until the first unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::TimerSlotsExhausted`](crate::WatchdogError::TimerSlotsExhausted)
    /// if the registry is full. Hosts treat this as fatal for the session.
    pub fn on_authenticated(&self, status: AuthStatus) -> WatchdogResult<()> {
        if status != AuthStatus::Ok || self.scheduler.get().is_some() {
            return Ok(());
        }

        let _registering = self.registration.lock();
        if self.scheduler.get().is_some() {
            return Ok(());
        }

        let controller = Weak::clone(&self.self_ref);
        let handler: AlarmHandler = Arc::new(move || {
            if let Some(controller) = controller.upgrade() {
                let cycle = controller.on_alarm();
                tracing::trace!(?cycle, "alarm handled");
            }
        });

        let scheduler = TimerScheduler::register(Arc::clone(&self.registry), handler)?;
        let id = scheduler.id();
        if self.scheduler.set(scheduler).is_err() {
            tracing::debug!(%id, "timer registered twice; keeping the first");
        }
        tracing::debug!(%id, "liveness timer registered");
        Ok(())
    }

    /// Unit-of-work hook, called before the worker executes a command.
    ///
    /// Makes sure a liveness check is pending while the work runs. Returns
    /// whether the timer was armed by this call.
    ///
    /// # Errors
    ///
    /// Returns an error if the timer slot vanished or the deadline overflows.
    pub fn on_unit_of_work(&self, kind: CommandKind) -> WatchdogResult<bool> {
        let Some(scheduler) = self.scheduler.get() else {
            return Ok(false);
        };
        let config = *self.config.read();
        if !config.enabled
            || self.token.blocks_probing()
            || self.state.get().is_terminal()
            || kind == CommandKind::Utility
        {
            return Ok(false);
        }

        let armed = scheduler.ensure_scheduled(config.interval())?;
        if armed {
            self.stats.inc_rearm();
            tracing::debug!(
                interval_secs = config.interval_secs,
                "liveness check armed for unit of work"
            );
        }
        Ok(armed)
    }

    /// Alarm callback: probe the peer and react to the outcome.
    ///
    /// On success or backpressure the next check is scheduled, unless an
    /// interrupt arrived while the probe was written. On a failed
    /// write the state becomes [`WatchdogState::CancelRequested`], the
    /// dispatcher runs once and nothing is rescheduled.
    pub fn on_alarm(&self) -> ProbeCycle {
        if self.token.blocks_probing() {
            return self.skip(SkipReason::InterruptPending);
        }

        let Some(_in_flight) = self.probe_guard.try_lock() else {
            return self.skip(SkipReason::InFlight);
        };

        // The interrupt state may have changed while taking the guard.
        if self.token.blocks_probing() {
            return self.skip(SkipReason::InterruptPending);
        }

        let config = *self.config.read();
        if !config.enabled {
            return self.skip(SkipReason::Disabled);
        }

        if self.state.begin_probe().is_err() {
            return self.skip(SkipReason::CancelRequested);
        }

        let probe = match self.encoder.encode(self.session.framing()) {
            Ok(probe) => probe,
            Err(e) => {
                debug_assert!(false, "probe frame does not fit: {e}");
                tracing::error!(error = %e, "liveness probe could not be encoded");
                self.stats.inc_encode_error();
                self.end_probe();
                self.reschedule(&config);
                return ProbeCycle::Skipped(SkipReason::EncodeFailed);
            }
        };

        let outcome = self.flusher.flush(&probe, self.session.as_ref());
        self.stats.record_outcome(outcome);

        if outcome.is_failure() {
            if let Err(e) = self.state.request_cancel() {
                tracing::debug!(error = %e, "unexpected state after failed probe");
            }
            tracing::warn!("peer connection lost; cancelling current unit of work");
            self.stats.inc_cancellation();
            self.dispatcher.cancel();
            return ProbeCycle::Cancelled;
        }

        tracing::trace!(%outcome, "liveness probe delivered");
        self.end_probe();
        // An interrupt raised while the probe was being written owns the
        // session now; leave the timer unarmed.
        if self.token.blocks_probing() {
            tracing::debug!("interrupt arrived during probe; not rescheduling");
        } else {
            self.reschedule(&config);
        }
        ProbeCycle::Delivered(outcome)
    }

    /// Return to `Idle` once the worker has unwound a cancelled unit of work.
    ///
    /// Clears the session's pending interrupt as well. Returns the state the
    /// controller was in.
    pub fn reset_for_next_unit(&self) -> WatchdogState {
        let previous = self.state.reset();
        self.token.reset();
        if previous != WatchdogState::Idle {
            tracing::debug!(%previous, "watchdog reset for next unit of work");
        }
        previous
    }

    /// Turn probing on or off for this session.
    pub fn set_enabled(&self, enabled: bool) {
        self.config.write().enabled = enabled;
        tracing::debug!(enabled, "watchdog enable changed");
    }

    /// Change the probe interval for this session.
    ///
    /// A check that is already pending keeps its deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is out of range.
    pub fn set_interval_secs(&self, interval_secs: u32) -> WatchdogResult<()> {
        let mut config = self.config.write();
        let updated = WatchdogConfig {
            interval_secs,
            ..*config
        };
        updated.validate()?;
        *config = updated;
        drop(config);
        tracing::debug!(interval_secs, "watchdog interval changed");
        Ok(())
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> WatchdogConfig {
        *self.config.read()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WatchdogState {
        self.state.get()
    }

    /// The session's cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Probe counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Timer registry used by this session.
    #[must_use]
    pub fn registry(&self) -> &Arc<TimerRegistry> {
        &self.registry
    }

    /// Timer slot, once registered.
    #[must_use]
    pub fn timer_id(&self) -> Option<TimerId> {
        self.scheduler.get().map(TimerScheduler::id)
    }

    /// Whether the timer slot has been claimed.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.scheduler.get().is_some()
    }

    fn skip(&self, reason: SkipReason) -> ProbeCycle {
        self.stats.inc_skipped();
        tracing::trace!(reason = reason.as_str(), "liveness probe skipped");
        ProbeCycle::Skipped(reason)
    }

    fn end_probe(&self) {
        if let Err(e) = self.state.finish_probe() {
            tracing::debug!(error = %e, "probe finished outside Probing");
        }
    }

    fn reschedule(&self, config: &WatchdogConfig) {
        let Some(scheduler) = self.scheduler.get() else {
            return;
        };
        match scheduler.ensure_scheduled(config.interval()) {
            Ok(true) => {
                self.stats.inc_rearm();
                tracing::debug!(
                    interval_secs = config.interval_secs,
                    "liveness check rescheduled"
                );
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "liveness check could not be rescheduled"),
        }
    }
}

impl fmt::Debug for WatchdogController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchdogController")
            .field("config", &self.config())
            .field("framing", &self.session.framing())
            .field("timer", &self.timer_id())
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Builder for [`WatchdogController`].
pub struct WatchdogControllerBuilder {
    session: Arc<dyn PeerSession>,
    config: WatchdogConfig,
    registry: Option<Arc<TimerRegistry>>,
    token: Option<CancelToken>,
    dispatcher: Option<Arc<dyn CancellationDispatcher>>,
}

impl WatchdogControllerBuilder {
    /// Initial configuration.
    #[must_use]
    pub fn config(mut self, config: WatchdogConfig) -> Self {
        self.config = config;
        self
    }

    /// Timer registry to claim a slot in. Defaults to a fresh registry.
    #[must_use]
    pub fn registry(mut self, registry: Arc<TimerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Session cancellation token. Defaults to a fresh token.
    #[must_use]
    pub fn token(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Cancellation delivery. Defaults to a [`TokenDispatcher`] on the
    /// session token.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn CancellationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Build the controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> WatchdogResult<Arc<WatchdogController>> {
        self.config.validate()?;

        let token = self.token.unwrap_or_default();
        let dispatcher = self
            .dispatcher
            .unwrap_or_else(|| Arc::new(TokenDispatcher::new(token.clone())));
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(TimerRegistry::new()));
        let session = self.session;
        let config = self.config;

        Ok(Arc::new_cyclic(|self_ref| WatchdogController {
            self_ref: Weak::clone(self_ref),
            config: RwLock::new(config),
            session,
            registry,
            scheduler: OnceLock::new(),
            registration: Mutex::new(()),
            probe_guard: Mutex::new(()),
            token,
            dispatcher,
            state: StateCell::new(),
            stats: ProbeStats::new(),
            encoder: ProbeEncoder::new(),
            flusher: SocketFlusher::new(),
        }))
    }
}

impl fmt::Debug for WatchdogControllerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchdogControllerBuilder")
            .field("config", &self.config)
            .field("framing", &self.session.framing())
            .finish_non_exhaustive()
    }
}
