//! IOCTL control-code construction.
//!
//! A control request to the coin acceptor driver is identified by a composite
//! code built from the device type, the requested access, the logical
//! function number and the buffer transfer method:
//!
//! ```text
//! (device_type << 16) | (access << 14) | ((0x800 + function) << 2) | method
//! ```
//!
//! Function numbers for the coin acceptor device class start at the custom
//! base offset `0x800` and are assigned in [`DeviceFunction`] declaration
//! order. The numbering is part of the driver contract; do not reorder.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Custom function base offset for the coin acceptor device class.
pub const FUNCTION_BASE: u32 = 0x800;

/// Logical control functions understood by the coin acceptor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum DeviceFunction {
    /// Number of change records queued in the device.
    RecordCount = 0,
    /// Energize the reject mechanism (coins fall to the return cup).
    RejectOn = 1,
    /// Release the reject mechanism.
    RejectOff = 2,
    /// Energize the diverter solenoid (route to hopper).
    DiverterOn = 3,
    /// Release the diverter solenoid (route to cashbox).
    DiverterOff = 4,
    /// Read the raw input register value.
    RegisterValue = 5,
    /// Number of polls the device has performed since start.
    PollingCount = 6,
    /// Peek at the next queued record without consuming it.
    Peek = 7,
    /// Acknowledge a consumed record by change id.
    Acknowledge = 8,
    /// Write the input register (diagnostic use).
    SetInputRegister = 9,
    /// Start the device's internal sensor polling.
    StartPolling = 10,
    /// Stop the device's internal sensor polling.
    StopPolling = 11,
}

impl DeviceFunction {
    /// Function number including the custom base offset.
    pub const fn number(self) -> u32 {
        FUNCTION_BASE + self as u32
    }
}

impl fmt::Display for DeviceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Requested access encoded into bits 14..16 of a control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AccessMode {
    Any = 0,
    Read = 1,
    Write = 2,
}

/// Buffer transfer method encoded into bits 0..2 of a control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TransferMethod {
    Buffered = 0,
    InDirect = 1,
    OutDirect = 2,
    Neither = 3,
}

/// A fully-built device control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlCode(u32);

impl ControlCode {
    /// Build a control code from its four components.
    pub const fn build(
        device_type: u16,
        function: DeviceFunction,
        access: AccessMode,
        method: TransferMethod,
    ) -> Self {
        Self(
            ((device_type as u32) << 16)
                | ((access as u32) << 14)
                | (function.number() << 2)
                | method as u32,
        )
    }

    /// Raw 32-bit control code value.
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Function number extracted back out of the code (bits 2..14).
    pub const fn function_number(self) -> u32 {
        (self.0 >> 2) & 0xFFF
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_numbering_from_base() {
        assert_eq!(DeviceFunction::RecordCount.number(), 0x800);
        assert_eq!(DeviceFunction::RejectOn.number(), 0x801);
        assert_eq!(DeviceFunction::RejectOff.number(), 0x802);
        assert_eq!(DeviceFunction::DiverterOn.number(), 0x803);
        assert_eq!(DeviceFunction::DiverterOff.number(), 0x804);
        assert_eq!(DeviceFunction::StopPolling.number(), 0x80B);
    }

    #[test]
    fn test_control_code_layout() {
        // Hand-computed: (0x8010 << 16) | (2 << 14) | (0x801 << 2) | 0
        let code = ControlCode::build(
            0x8010,
            DeviceFunction::RejectOn,
            AccessMode::Write,
            TransferMethod::Buffered,
        );
        assert_eq!(code.value(), 0x8010_0000 | 0x8000 | (0x801 << 2));
    }

    #[test]
    fn test_control_code_method_bits() {
        let code = ControlCode::build(
            0x8010,
            DeviceFunction::Peek,
            AccessMode::Read,
            TransferMethod::Neither,
        );
        assert_eq!(code.value() & 0x3, 3);
        assert_eq!((code.value() >> 14) & 0x3, 1);
    }

    #[test]
    fn test_function_number_roundtrip() {
        for function in [
            DeviceFunction::RecordCount,
            DeviceFunction::Acknowledge,
            DeviceFunction::StartPolling,
        ] {
            let code = ControlCode::build(
                0x8010,
                function,
                AccessMode::Any,
                TransferMethod::Buffered,
            );
            assert_eq!(code.function_number(), function.number());
        }
    }

    #[test]
    fn test_display_formats_hex() {
        let code = ControlCode::build(
            0x8010,
            DeviceFunction::RecordCount,
            AccessMode::Any,
            TransferMethod::Buffered,
        );
        assert!(code.to_string().starts_with("0x"));
    }
}
