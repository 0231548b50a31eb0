//! Core domain vocabulary for the coindrop coin-acceptor subsystem.
//!
//! This crate holds the types shared by the device channel and the acceptor
//! engine: the error taxonomy, the published domain events, the diverter and
//! accept/reject enums, the disable-reason bitset with its remedy table, and
//! the timing / signal-line constants the pulse decoder is calibrated to.
//!
//! Nothing in this crate performs I/O; it is pure vocabulary so that both the
//! hardware-facing crates and their tests can depend on it without pulling in
//! a runtime.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
