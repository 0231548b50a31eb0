//! The change record wire format.
//!
//! The driver reports every detected signal-line transition as a fixed-size
//! binary record. Encoding and decoding live here, behind a single boundary,
//! so the decoder never touches raw bytes: it only ever sees the typed
//! [`ChangeRecord`] value.
//!
//! # Layout (version 1, little-endian)
//!
//! ```text
//! offset  size  field
//! 0       1     layout version (currently 1)
//! 1       4     change id (sequence number)
//! 5       4     new signal-line value mask
//! 9       8     elapsed since previous change, raw elapsed units
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use coindrop_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Current binary layout version.
pub const RECORD_LAYOUT_VERSION: u8 = 1;

/// Size of one encoded record on the wire, bytes.
pub const RECORD_WIRE_SIZE: usize = 17;

/// One hardware-reported signal-line transition.
///
/// Immutable value; one instance is consumed per decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Device-assigned sequence number, used for acknowledgement.
    pub change_id: u32,

    /// New value of all signal lines after this transition, as a bit mask of
    /// the `*_LINE` constants in `coindrop_core::constants`.
    pub new_value: u32,

    /// Time since the previous transition, in raw hardware elapsed units.
    pub elapsed: u64,
}

impl ChangeRecord {
    /// Create a record.
    pub fn new(change_id: u32, new_value: u32, elapsed: u64) -> Self {
        Self {
            change_id,
            new_value,
            elapsed,
        }
    }

    /// True when the given line bit is high in the new value mask.
    pub fn line_high(&self, mask: u32) -> bool {
        self.new_value & mask != 0
    }

    /// Encode into the version-1 wire layout.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RECORD_WIRE_SIZE);
        buf.put_u8(RECORD_LAYOUT_VERSION);
        buf.put_u32_le(self.change_id);
        buf.put_u32_le(self.new_value);
        buf.put_u64_le(self.elapsed);
        buf.freeze()
    }

    /// Decode one record from a wire buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if the buffer is not exactly one
    /// record long or carries an unknown layout version.
    pub fn decode(mut buf: &[u8]) -> Result<Self> {
        if buf.len() != RECORD_WIRE_SIZE {
            return Err(Error::InvalidRecord(format!(
                "expected {RECORD_WIRE_SIZE} bytes, got {}",
                buf.len()
            )));
        }
        let version = buf.get_u8();
        if version != RECORD_LAYOUT_VERSION {
            return Err(Error::InvalidRecord(format!(
                "unknown layout version {version}"
            )));
        }
        let change_id = buf.get_u32_le();
        let new_value = buf.get_u32_le();
        let elapsed = buf.get_u64_le();
        Ok(Self {
            change_id,
            new_value,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coindrop_core::constants::{CREDIT_LINE, SENSE_LINE};

    #[test]
    fn test_encode_layout() {
        let record = ChangeRecord::new(7, SENSE_LINE | CREDIT_LINE, 2_000);
        let wire = record.encode();
        assert_eq!(wire.len(), RECORD_WIRE_SIZE);
        assert_eq!(wire[0], RECORD_LAYOUT_VERSION);
        assert_eq!(&wire[1..5], &7u32.to_le_bytes());
        assert_eq!(&wire[5..9], &3u32.to_le_bytes());
        assert_eq!(&wire[9..17], &2_000u64.to_le_bytes());
    }

    #[test]
    fn test_decode_roundtrip() {
        let record = ChangeRecord::new(u32::MAX, 0x0F, u64::MAX);
        let back = ChangeRecord::decode(&record.encode()).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_decode_rejects_short_buffer() {
        let err = ChangeRecord::decode(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut wire = ChangeRecord::new(1, 0, 0).encode().to_vec();
        wire[0] = 9;
        let err = ChangeRecord::decode(&wire).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord(_)));
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let record = ChangeRecord::new(9, SENSE_LINE | CREDIT_LINE, 4_200);
        let json = serde_json::to_string(&record).unwrap();
        let back: ChangeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_line_high() {
        let record = ChangeRecord::new(1, SENSE_LINE, 100);
        assert!(record.line_high(SENSE_LINE));
        assert!(!record.line_high(CREDIT_LINE));
    }
}
