//! # peerguard-probe
//!
//! Liveness probe assembly and delivery for `peerguard`.
//!
//! A probe is a small, protocol-valid message that a conforming peer treats as
//! ordinary asynchronous status chatter. Writing it to the peer socket is the
//! cheapest way to learn whether the transport is still alive while the worker
//! is busy doing something else.
//!
//! ## Architecture
//!
//! - [`buffer`] - Fixed-capacity, allocation-free append buffer
//! - [`encoder`] - Probe frames for the legacy and modern framing variants
//! - [`flusher`] - Non-blocking delivery with a tri-state health verdict
//! - [`error`] - Probe-specific error types
//!
//! ## Alarm-path safety
//!
//! Everything in this crate can run on the watchdog's alarm path:
//! - **No heap allocations** while encoding or flushing
//! - **No blocking**: would-block is reported, never waited on
//!
//! ## Example
//!
//! ```rust
//! use peerguard_probe::prelude::*;
//!
//! let probe = ProbeEncoder::new().encode(FramingVariant::Legacy)?;
//! assert_eq!(probe.as_bytes().first(), Some(&b'N'));
//! assert_eq!(probe.as_bytes().last(), Some(&0));
//! # Ok::<(), ProbeError>(())
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic
)]
#![warn(clippy::pedantic, missing_docs, missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod buffer;
pub mod encoder;
pub mod error;
pub mod flusher;

pub mod prelude;

pub use buffer::{PROBE_BUFFER_CAPACITY, ProbeBuffer};
pub use encoder::{FramingVariant, ProbeEncoder};
pub use error::{ProbeError, ProbeResult};
pub use flusher::{FlushOutcome, ProbeSink, SocketFlusher};
