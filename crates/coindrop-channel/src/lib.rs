//! Native device channel for pulse-signal coin acceptors.
//!
//! This crate is the hardware abstraction under the coin-acceptor engine: it
//! knows how to address a kernel-mode coin acceptor device (interface GUID,
//! synchronous or overlapped mode, device type code), how to build the IOCTL
//! control codes the driver understands, and how to decode the fixed-size
//! binary change records the driver produces on every signal-line transition.
//! It has no knowledge of coin semantics.
//!
//! # Design
//!
//! The channel is exposed through two traits using native `async fn` (Rust
//! 1.90 + Edition 2024 RPITIT, no `async_trait` macro):
//!
//! - [`DeviceBus`](traits::DeviceBus) discovers a device interface and opens
//!   a channel to it.
//! - [`DeviceChannel`](traits::DeviceChannel) reads change records and issues
//!   control requests over the opened handle.
//!
//! Because RPITIT traits are not object-safe, concrete dispatch goes through
//! the [`AnyDeviceChannel`](devices::AnyDeviceChannel) enum wrapper. The only
//! in-tree implementation is the [`mock`] device, which is what development,
//! CI and the emulated cabinet run against; the real kernel transport arrives
//! behind the `hardware-kernel` feature.
//!
//! # Read semantics
//!
//! A read that times out in overlapped mode is not an error: it is the normal
//! "no new coin activity yet" case and surfaces as
//! [`ReadOutcome::Pending`](traits::ReadOutcome). Only a closed or failed
//! device produces an `Err`.

pub mod descriptor;
pub mod devices;
pub mod ioctl;
pub mod mock;
pub mod record;
pub mod traits;

pub use coindrop_core::{Error, Result};
pub use descriptor::{
    COIN_ACCEPTOR_INTERFACE, COIN_ACCEPTOR_NV_INTERFACE, ChannelMode, DeviceDescriptor,
};
pub use devices::AnyDeviceChannel;
pub use ioctl::{AccessMode, ControlCode, DeviceFunction, TransferMethod};
pub use record::{ChangeRecord, RECORD_LAYOUT_VERSION, RECORD_WIRE_SIZE};
pub use traits::{DeviceBus, DeviceChannel, ReadOutcome};
