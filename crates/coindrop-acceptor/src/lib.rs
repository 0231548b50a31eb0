//! Coin acceptor engine for pulse-signal coin acceptors.
//!
//! This crate sits on top of [`coindrop_channel`] and turns raw signal-line
//! transition records into domain events, and domain commands into device
//! control requests:
//!
//! - [`adapter::CoinAcceptorAdapter`] wraps the device channel in mechanical
//!   operations (reject on/off, diverter on/off, polling, acknowledge).
//! - [`decoder::PulseDecoder`] classifies pulse widths on the sense, credit
//!   and alarm lines as noise, valid or fault and correlates sense/credit
//!   pairs into confirmed coin-in events.
//! - [`diverter::DiverterController`] defers diverter target changes until no
//!   coin is mid-transit.
//! - [`availability::AvailabilityManager`] accumulates disable reasons and
//!   computes enabled state from the remedy table.
//! - [`service::CoinAcceptorService`] owns the lifecycle, the poll loop and
//!   the event channel, wiring the pieces together.
//!
//! # Concurrency
//!
//! The device handle is owned exclusively by the poll task. Control callers
//! (enable, disable, divert requests) mutate shared engine state under a
//! mutex, with no I/O and no await points while it is held, and enqueue
//! mechanism commands the poll task applies on its next wake. Records are
//! therefore processed strictly in device order and control mutations take
//! effect atomically between poll iterations.

pub mod adapter;
pub mod availability;
pub mod decoder;
pub mod diverter;
pub mod properties;
pub mod service;

pub use adapter::CoinAcceptorAdapter;
pub use availability::{AvailabilityManager, MechanismAction};
pub use coindrop_core::{
    AcceptState, CoinEvent, DisabledReasons, DiverterTarget, EnableReason, Error, FaultKind,
    Result,
};
pub use decoder::PulseDecoder;
pub use diverter::DiverterController;
pub use properties::{AcceptorProperties, MemoryProperties, PropertyStore};
pub use service::{CoinAcceptorService, RunState, ServiceHandle};
