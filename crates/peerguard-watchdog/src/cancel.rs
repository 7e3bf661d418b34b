//! Delivery of the cooperative abort request.
//!
//! Dispatchers are invoked from the alarm path: they must not block and they
//! never report failure to the caller. Redundant deliveries are expected; the
//! executor collapses them.

use std::fmt;
use std::sync::Arc;

use crate::interrupt::CancelToken;

/// Delivers a cancellation request to the session's current unit of work.
pub trait CancellationDispatcher: Send + Sync + fmt::Debug {
    /// Request cancellation. Best effort and non-blocking.
    fn cancel(&self);
}

impl<T: CancellationDispatcher + ?Sized> CancellationDispatcher for Arc<T> {
    fn cancel(&self) {
        (**self).cancel();
    }
}

/// Sets the session's [`CancelToken`].
#[derive(Debug, Clone)]
pub struct TokenDispatcher {
    token: CancelToken,
}

impl TokenDispatcher {
    /// Dispatch into `token`.
    #[must_use]
    pub fn new(token: CancelToken) -> Self {
        Self { token }
    }
}

impl CancellationDispatcher for TokenDispatcher {
    fn cancel(&self) {
        if !self.token.request() {
            tracing::trace!("cancellation already pending");
        }
    }
}

/// Sends an OS signal to this process and, where possible, to the process
/// group it leads.
///
/// Helper processes spawned by the unit of work share the group, so they see
/// the request too. Delivery errors such as `ESRCH` for a process that does
/// not lead a group are ignored.
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub struct SignalDispatcher {
    signal: Option<nix::sys::signal::Signal>,
    process_group: bool,
}

#[cfg(unix)]
impl SignalDispatcher {
    /// Deliver `SIGINT`, the conventional cooperative cancel.
    #[must_use]
    pub fn interrupt() -> Self {
        Self::with_signal(Some(nix::sys::signal::Signal::SIGINT))
    }

    /// Deliver `signal`; `None` only probes that the targets exist.
    #[must_use]
    pub fn with_signal(signal: Option<nix::sys::signal::Signal>) -> Self {
        Self {
            signal,
            process_group: true,
        }
    }

    /// Whether to also signal the process group.
    #[must_use]
    pub fn process_group(mut self, enabled: bool) -> Self {
        self.process_group = enabled;
        self
    }
}

#[cfg(unix)]
impl CancellationDispatcher for SignalDispatcher {
    fn cancel(&self) {
        use nix::sys::signal::{kill, killpg};
        use nix::unistd::Pid;

        let pid = Pid::this();
        if self.process_group
            && let Err(errno) = killpg(pid, self.signal)
        {
            tracing::trace!(%pid, %errno, "process group signal not delivered");
        }
        if let Err(errno) = kill(pid, self.signal) {
            tracing::trace!(%pid, %errno, "process signal not delivered");
        }
    }
}

/// Fans a request out to several dispatchers in order.
#[derive(Debug, Default)]
pub struct CompositeDispatcher {
    targets: Vec<Arc<dyn CancellationDispatcher>>,
}

impl CompositeDispatcher {
    /// Create an empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dispatcher.
    #[must_use]
    pub fn with(mut self, target: Arc<dyn CancellationDispatcher>) -> Self {
        self.targets.push(target);
        self
    }

    /// Number of dispatchers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether there are no dispatchers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl CancellationDispatcher for CompositeDispatcher {
    fn cancel(&self) {
        for target in &self.targets {
            target.cancel();
        }
    }
}
