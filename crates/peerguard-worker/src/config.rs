//! Worker configuration: JSON file defaults overridden by command-line flags.

use serde::{Deserialize, Serialize};
use std::path::Path;

use peerguard_watchdog::WatchdogConfig;
use peerguard_watchdog::registry::DEFAULT_TIMER_SLOTS;

use crate::error::{WorkerError, WorkerResult};

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5433";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Address the worker listens on.
    pub listen: String,
    /// Timer slots available to each session.
    pub timer_slots: usize,
    /// Watchdog settings every new session starts with.
    pub watchdog: WatchdogConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            timer_slots: DEFAULT_TIMER_SLOTS,
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn load(path: &Path) -> WorkerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> WorkerResult<()> {
        if self.timer_slots == 0 {
            return Err(WorkerError::InvalidConfiguration(
                "timer_slots must be at least 1".to_string(),
            ));
        }
        self.watchdog.validate()?;
        Ok(())
    }
}
