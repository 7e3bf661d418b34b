//! Error types for peerguard-worker

use peerguard_watchdog::WatchdogError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Watchdog error: {0}")]
    Watchdog(#[from] WatchdogError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
