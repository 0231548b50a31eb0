//! Device channel trait definitions.
//!
//! These traits are the contract between the coin-acceptor engine and the
//! device transport. They use native `async fn` methods (Edition 2024
//! RPITIT); for dynamic dispatch use the enum wrappers in
//! [`devices`](crate::devices), since RPITIT traits are not object-safe.

#![allow(async_fn_in_trait)]

use crate::descriptor::ChannelMode;
use crate::devices::AnyDeviceChannel;
use crate::ioctl::DeviceFunction;
use crate::record::ChangeRecord;
use bytes::Bytes;
use coindrop_core::Result;
use uuid::Uuid;

/// Outcome of a single read attempt on a device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A change record was available and has been consumed.
    Record(ChangeRecord),

    /// The overlapped wait period elapsed with no device activity. This is
    /// the normal idle case, not an error; the caller re-polls later.
    Pending,
}

/// An opened channel to one coin acceptor device.
///
/// The handle behind a channel is owned exclusively by its holder; the
/// orchestrator guarantees reads and control requests are never issued
/// concurrently.
pub trait DeviceChannel: Send + Sync {
    /// Read the next change record.
    ///
    /// In synchronous mode this blocks until a record arrives or the device
    /// fails. In overlapped mode it waits at most the descriptor's wait
    /// period and reports [`ReadOutcome::Pending`] on timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the device failed.
    async fn read_record(&mut self) -> Result<ReadOutcome>;

    /// Issue a control request with no response buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects or fails the request.
    async fn control(&mut self, function: DeviceFunction, payload: &[u8]) -> Result<()>;

    /// Issue a control request and read its typed response buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the request or the function
    /// produces no response.
    async fn control_with_response(
        &mut self,
        function: DeviceFunction,
        payload: &[u8],
    ) -> Result<Bytes>;

    /// Cancel any in-flight operation and close the handle.
    ///
    /// Idempotent: closing an already-closed channel is a no-op.
    async fn close(&mut self);
}

/// Discovery and opening of device interfaces.
pub trait DeviceBus: Send + Sync {
    /// Enumerate currently-present device interfaces matching `interface_id`
    /// and return the path of the first one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`](coindrop_core::Error::DeviceNotFound)
    /// if no matching interface is present.
    fn discover(&self, interface_id: Uuid) -> Result<String>;

    /// Open a channel on a discovered path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OpenFailed`](coindrop_core::Error::OpenFailed) if the
    /// handle cannot be opened (missing device, already opened exclusively).
    async fn open(&self, path: &str, mode: ChannelMode) -> Result<AnyDeviceChannel>;
}
