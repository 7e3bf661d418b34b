//! Watchdog configuration.
//!
//! Both knobs can be changed per session while it runs; see
//! [`WatchdogController::set_enabled`](crate::WatchdogController::set_enabled).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{WatchdogError, WatchdogResult};

/// Default probe interval in seconds.
pub const DEFAULT_INTERVAL_SECS: u32 = 10;

/// Largest accepted probe interval in seconds.
pub const MAX_INTERVAL_SECS: u32 = i32::MAX as u32;

/// Liveness watchdog configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Whether probing is enabled.
    pub enabled: bool,
    /// Seconds between probes while a unit of work is outstanding.
    ///
    /// Zero is accepted and probes as soon as the timer is armed.
    pub interval_secs: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl WatchdogConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is larger than [`MAX_INTERVAL_SECS`].
    pub fn validate(&self) -> WatchdogResult<()> {
        if self.interval_secs > MAX_INTERVAL_SECS {
            return Err(WatchdogError::invalid_configuration(format!(
                "interval_secs must be at most {MAX_INTERVAL_SECS}, got {}",
                self.interval_secs
            )));
        }
        Ok(())
    }

    /// Probe interval as a duration.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_secs))
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> WatchdogConfigBuilder {
        WatchdogConfigBuilder::default()
    }
}

/// Builder for `WatchdogConfig`.
#[derive(Debug, Default)]
pub struct WatchdogConfigBuilder {
    config: WatchdogConfig,
}

impl WatchdogConfigBuilder {
    /// Enable or disable probing.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the probe interval in seconds.
    #[must_use]
    pub fn interval_secs(mut self, secs: u32) -> Self {
        self.config.interval_secs = secs;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> WatchdogResult<WatchdogConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
