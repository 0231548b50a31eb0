//! Enum wrappers for device channel dispatch.
//!
//! Native `async fn` in traits (RPITIT) is not object-safe, so the engine
//! cannot hold a `Box<dyn DeviceChannel>`. Concrete dispatch goes through
//! this enum instead: zero-cost, type-safe, and extensible behind feature
//! flags when the real kernel transport lands.

use crate::ioctl::DeviceFunction;
use crate::mock::MockChannel;
use crate::traits::{DeviceChannel, ReadOutcome};
use bytes::Bytes;
use coindrop_core::Result;

/// Enum wrapper for device channel dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyDeviceChannel {
    /// Mock channel for development and testing.
    Mock(MockChannel),
    // The kernel-mode transport variant is added behind the
    // `hardware-kernel` feature once the driver binding exists.
}

impl DeviceChannel for AnyDeviceChannel {
    async fn read_record(&mut self) -> Result<ReadOutcome> {
        match self {
            Self::Mock(channel) => channel.read_record().await,
        }
    }

    async fn control(&mut self, function: DeviceFunction, payload: &[u8]) -> Result<()> {
        match self {
            Self::Mock(channel) => channel.control(function, payload).await,
        }
    }

    async fn control_with_response(
        &mut self,
        function: DeviceFunction,
        payload: &[u8],
    ) -> Result<Bytes> {
        match self {
            Self::Mock(channel) => channel.control_with_response(function, payload).await,
        }
    }

    async fn close(&mut self) {
        match self {
            Self::Mock(channel) => channel.close().await,
        }
    }
}
