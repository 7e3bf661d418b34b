//! Prelude for peerguard-watchdog.
//!
//! This module re-exports the most commonly used types for convenient importing.

pub use crate::cancel::{CancellationDispatcher, CompositeDispatcher, TokenDispatcher};
#[cfg(unix)]
pub use crate::cancel::SignalDispatcher;
pub use crate::config::WatchdogConfig;
pub use crate::controller::{ProbeCycle, SkipReason, WatchdogController};
pub use crate::driver::AlarmDriver;
pub use crate::error::{WatchdogError, WatchdogResult};
pub use crate::interrupt::{CancelToken, Cancelled};
pub use crate::registry::TimerRegistry;
pub use crate::scheduler::TimerScheduler;
pub use crate::session::{AuthStatus, CommandKind, PeerSession, TcpPeerSession};
pub use crate::state::WatchdogState;
pub use crate::stats::StatsSnapshot;
pub use crate::{FlushOutcome, FramingVariant};
