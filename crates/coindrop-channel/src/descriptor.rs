//! Device descriptors: which device interface to open, and how.
//!
//! A [`DeviceDescriptor`] is a small value created once at adapter
//! construction and read-only thereafter. It replaces the inheritance-based
//! "abstract device selector" pattern: the channel is a concrete type
//! parameterized by this descriptor, and the coin-acceptor adapter holds a
//! channel instance rather than deriving from one.

use coindrop_core::constants::{
    DEFAULT_DEVICE_TYPE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_PERIOD_MS,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Interface GUID of the standard coin acceptor device class.
pub const COIN_ACCEPTOR_INTERFACE: Uuid = Uuid::from_u128(0x9c1c_3f6a_52d4_4e7b_8a0f_7d2e_91b5_c043);

/// Interface GUID of the non-volatile coin acceptor device class.
///
/// The non-volatile variant keeps its change-record queue in battery-backed
/// memory across power cycles and requires every consumed record to be
/// acknowledged before it advances the queue.
pub const COIN_ACCEPTOR_NV_INTERFACE: Uuid =
    Uuid::from_u128(0x6e84_b2d1_0c5a_47f3_9d76_1fa8_33e0_5b92);

/// How the channel handle is opened and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Reads block until a record is available or the device errors.
    Synchronous,

    /// Reads are issued overlapped and waited on up to the descriptor's wait
    /// period; a timeout reports [`ReadOutcome::Pending`](crate::ReadOutcome)
    /// rather than an error.
    Overlapped,
}

/// Addressing and mode parameters for one coin acceptor device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Device interface GUID to discover.
    pub interface_id: Uuid,

    /// Open/read mode.
    pub mode: ChannelMode,

    /// Device type code used when building control codes.
    pub device_type: u16,

    /// Poll timer interval, milliseconds.
    pub poll_interval_ms: u64,

    /// Overlapped-read wait period, milliseconds.
    pub wait_period_ms: u64,

    /// Whether consumed records must be acknowledged to advance the device's
    /// internal queue. Devices without the requirement report ack success
    /// unconditionally.
    pub requires_ack: bool,
}

impl DeviceDescriptor {
    /// Descriptor for the standard coin acceptor class.
    pub fn standard() -> Self {
        Self {
            interface_id: COIN_ACCEPTOR_INTERFACE,
            mode: ChannelMode::Overlapped,
            device_type: DEFAULT_DEVICE_TYPE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            wait_period_ms: DEFAULT_WAIT_PERIOD_MS,
            requires_ack: false,
        }
    }

    /// Descriptor for the non-volatile coin acceptor class.
    pub fn non_volatile() -> Self {
        Self {
            interface_id: COIN_ACCEPTOR_NV_INTERFACE,
            requires_ack: true,
            ..Self::standard()
        }
    }

    /// Set the channel mode.
    pub fn with_mode(mut self, mode: ChannelMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the overlapped-read wait period.
    pub fn with_wait_period_ms(mut self, wait_period_ms: u64) -> Self {
        self.wait_period_ms = wait_period_ms;
        self
    }

    /// Set the poll timer interval.
    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }
}
