//! # peerguard-watchdog
//!
//! Connection-liveness watchdog for long-running units of work.
//!
//! While a worker is busy executing a command it does not read from its peer,
//! so a peer that silently vanished goes unnoticed until the work finishes.
//! The watchdog periodically writes an inert probe to the peer socket from an
//! alarm thread and, if the write fails, asks the current unit of work to
//! cancel itself.
//!
//! ## Architecture
//!
//! - [`controller`] - Per-session watchdog driving probe cycles and cancellation
//! - [`scheduler`] - Idempotent "ensure a check is pending" on one timer slot
//! - [`registry`] - Bounded per-session timer slots with fired indicators
//! - [`driver`] - Thread that runs due alarm handlers
//! - [`cancel`] - Cancellation dispatchers (token, OS signal, composite)
//! - [`interrupt`] - Cooperative cancellation token
//! - [`session`] - The peer connection as the watchdog sees it
//! - [`state`] - Controller state machine
//! - [`stats`] - Probe counters
//! - [`config`] - Enable flag and probe interval
//! - [`error`] - Watchdog-specific error types
//!
//! ## Alarm-path guarantees
//!
//! - **Single flight**: at most one probe cycle per session at a time
//! - **No blocking waits**: socket backpressure is reported, never waited out
//! - **No feedback loops**: nothing is scheduled while an interrupt is pending
//!
//! ## Example
//!
//! ```rust
//! use peerguard_watchdog::prelude::*;
//! use std::net::{TcpListener, TcpStream};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:0")?;
//! let _client = TcpStream::connect(listener.local_addr()?)?;
//! let (stream, _) = listener.accept()?;
//!
//! let session = Arc::new(TcpPeerSession::new(stream, FramingVariant::Modern));
//! let controller = WatchdogController::builder(session)
//!     .config(WatchdogConfig::builder().enabled(true).interval_secs(10).build()?)
//!     .build()?;
//! let _driver = AlarmDriver::spawn(Arc::clone(controller.registry()), "peerguard-alarm")?;
//!
//! controller.on_authenticated(AuthStatus::Ok)?;
//! assert!(controller.on_unit_of_work(CommandKind::Statement)?);
//! assert!(controller.token().check().is_ok());
//! # Ok(())
//! # }
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cancel;
pub mod clock;
pub mod config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod interrupt;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod stats;

pub mod prelude;

#[cfg(unix)]
pub use cancel::SignalDispatcher;
pub use cancel::{CancellationDispatcher, CompositeDispatcher, TokenDispatcher};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{WatchdogConfig, WatchdogConfigBuilder};
pub use controller::{ProbeCycle, SkipReason, WatchdogController, WatchdogControllerBuilder};
pub use driver::AlarmDriver;
pub use error::{WatchdogError, WatchdogResult};
pub use interrupt::{CancelToken, Cancelled};
pub use registry::{AlarmHandler, TimerId, TimerRegistry};
pub use scheduler::TimerScheduler;
pub use session::{AuthStatus, CommandKind, PeerSession, TcpPeerSession};
pub use state::WatchdogState;
pub use stats::{ProbeStats, StatsSnapshot};

// Re-export the probe types that appear in this crate's API
pub use peerguard_probe::{FlushOutcome, FramingVariant};
