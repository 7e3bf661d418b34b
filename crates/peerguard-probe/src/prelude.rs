//! Prelude for peerguard-probe.
//!
//! This module re-exports the most commonly used types for convenient importing.

pub use crate::buffer::{PROBE_BUFFER_CAPACITY, ProbeBuffer};
pub use crate::encoder::{FramingVariant, ProbeEncoder};
pub use crate::error::{ProbeError, ProbeResult};
pub use crate::flusher::{FlushOutcome, ProbeSink, SocketFlusher};
