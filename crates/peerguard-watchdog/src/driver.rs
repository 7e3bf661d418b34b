//! Thread that turns registry deadlines into alarm callbacks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{WatchdogError, WatchdogResult};
use crate::registry::TimerRegistry;

/// Background thread that sleeps until the earliest armed deadline and then
/// runs the due handlers.
///
/// Dropping the driver shuts the registry down and joins the thread. The
/// driver waits on wall time, so it only makes sense with a registry on the
/// monotonic clock.
#[derive(Debug)]
pub struct AlarmDriver {
    registry: Arc<TimerRegistry>,
    handle: Option<JoinHandle<()>>,
}

impl AlarmDriver {
    /// Start the driver thread for `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchdogError::DriverSpawnFailed`] if the OS refuses the thread.
    pub fn spawn(registry: Arc<TimerRegistry>, name: impl Into<String>) -> WatchdogResult<Self> {
        let worker = Arc::clone(&registry);
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                tracing::trace!("alarm driver started");
                let mut fired = 0usize;
                while worker.wait_for_due() {
                    fired = fired.saturating_add(worker.fire_due());
                }
                tracing::trace!(fired, "alarm driver stopped");
            })
            .map_err(|e| WatchdogError::DriverSpawnFailed(e.to_string()))?;

        Ok(Self {
            registry,
            handle: Some(handle),
        })
    }

    /// Registry served by this driver.
    #[must_use]
    pub fn registry(&self) -> &Arc<TimerRegistry> {
        &self.registry
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.registry.shutdown();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("alarm driver thread panicked");
        }
    }
}

impl Drop for AlarmDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
