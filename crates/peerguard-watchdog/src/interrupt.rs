//! Cooperative cancellation state shared between a session's executor and
//! its watchdog.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;

/// Returned by [`CancelToken::check`] once cancellation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("canceling statement due to peer connection loss")]
pub struct Cancelled;

#[derive(Debug, Default)]
struct TokenInner {
    requested: AtomicBool,
    parallel_message_pending: AtomicBool,
    requests: AtomicU64,
}

/// Pending-interrupt flags for one session.
///
/// Cheap to clone; all clones observe the same state. Setting the flag is
/// lock-free and may happen from any thread. Duplicate requests collapse into
/// one pending interrupt.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    /// Create a token with nothing pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` if no request was pending yet.
    pub fn request(&self) -> bool {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        !self.inner.requested.swap(true, Ordering::AcqRel)
    }

    /// Whether an interrupt is pending.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Return `Err(Cancelled)` if an interrupt is pending.
    ///
    /// Executors call this at their interruption points.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when cancellation was requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_requested() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Mark that a message from a parallel helper raised the pending interrupt.
    pub fn set_parallel_message_pending(&self, pending: bool) {
        self.inner
            .parallel_message_pending
            .store(pending, Ordering::Release);
    }

    /// Whether a parallel helper message is pending.
    #[must_use]
    pub fn parallel_message_pending(&self) -> bool {
        self.inner.parallel_message_pending.load(Ordering::Acquire)
    }

    /// Whether the pending interrupt state forbids probing.
    ///
    /// An interrupt raised only to deliver a parallel helper message does not
    /// block the watchdog.
    #[must_use]
    pub fn blocks_probing(&self) -> bool {
        self.is_requested() && !self.parallel_message_pending()
    }

    /// Clear all pending flags once the executor has handled them.
    pub fn reset(&self) {
        self.inner.requested.store(false, Ordering::Release);
        self.inner
            .parallel_message_pending
            .store(false, Ordering::Release);
    }

    /// Total number of requests, including collapsed duplicates.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }
}
