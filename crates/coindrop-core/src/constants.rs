//! Timing, signal-line and configuration constants for the coin acceptor.
//!
//! All pulse classification is tick-count based: the hardware reports elapsed
//! time in raw elapsed units on every change record, and the decoder divides
//! by [`TICK_DIVISOR`] to get decoder ticks. Thresholds are integer constants
//! compared with exact `>` / `<` — there is no rounding tolerance, because the
//! windows were calibrated against the optic assembly at this granularity.

// ============================================================================
// Tick conversion
// ============================================================================

/// Raw hardware elapsed-time units per decoder tick.
///
/// The kernel driver timestamps transitions in its own elapsed-time unit;
/// every threshold below is expressed in decoder ticks after division by
/// this factor.
pub const TICK_DIVISOR: u64 = 100;

// ============================================================================
// Pulse width windows (decoder ticks)
// ============================================================================

/// Minimum valid sense pulse width. Anything shorter is optic noise.
pub const SENSE_PULSE_MIN_TICKS: u64 = 10;

/// Maximum valid sense pulse width. Exceeding it means a coin is jammed in
/// the entry optic and the sense line is latched into fault.
pub const SENSE_PULSE_MAX_TICKS: u64 = 40;

/// Minimum valid credit pulse width.
pub const CREDIT_PULSE_MIN_TICKS: u64 = 10;

/// Maximum valid credit pulse width.
pub const CREDIT_PULSE_MAX_TICKS: u64 = 40;

/// Minimum valid alarm pulse width.
pub const ALARM_PULSE_MIN_TICKS: u64 = 10;

/// Maximum valid alarm pulse width. The alarm optic sits deeper in the coin
/// path and tolerates a slightly wider pulse than the entry optics.
pub const ALARM_PULSE_MAX_TICKS: u64 = 50;

// ============================================================================
// Correlation windows (decoder ticks)
// ============================================================================

/// Maximum time a sense pulse may wait for its companion credit pulse.
///
/// When the correlation timer exceeds this window the outstanding sense
/// pulses are abandoned, so a stale sense pulse can never be matched against
/// an unrelated later credit pulse.
pub const SENSE_TO_CREDIT_MAX_TICKS: u64 = 100;

/// Time a coin needs to travel from the credit optic past the diverter
/// decision point. The mechanical diverter must not change target while a
/// coin is inside this window.
pub const COIN_TRANSIT_TICKS: u64 = 400;

// ============================================================================
// Signal line bit masks
// ============================================================================

/// Sense optic line in a change record's value mask.
pub const SENSE_LINE: u32 = 0x01;

/// Credit optic line.
pub const CREDIT_LINE: u32 = 0x02;

/// Alarm (yo-yo) optic line.
pub const ALARM_LINE: u32 = 0x04;

/// Diverter position feedback line. Bit set means the diverter is routing
/// coins to the hopper; clear means the cashbox.
pub const DIVERTER_LINE: u32 = 0x08;

// ============================================================================
// Configuration defaults
// ============================================================================

/// Default monetary value of one accepted token, in the smallest currency
/// unit (100000 = 1.00 currency unit at standard denomination scaling).
pub const DEFAULT_TOKEN_VALUE: i64 = 100_000;

/// Default poll timer interval, milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default overlapped-read wait period, milliseconds. A read that sees no
/// device activity within this period reports "nothing yet", not an error.
pub const DEFAULT_WAIT_PERIOD_MS: u64 = 100;

/// Device type code used when building control codes for the coin acceptor
/// device class. Custom device types live at 0x8000 and above.
pub const DEFAULT_DEVICE_TYPE: u16 = 0x8010;

// ============================================================================
// Property keys
// ============================================================================

/// Persisted token value property (i64, smallest currency unit).
pub const PROP_TOKEN_VALUE: &str = "coin_acceptor.token_value";

/// Persisted acceptance-enabled flag (bool, defaults to false).
pub const PROP_ACCEPTOR_ENABLED: &str = "coin_acceptor.enabled";

/// Hopper-enabled flag (bool, defaults to true). When set the diverter
/// defaults to routing coins to the hopper.
pub const PROP_HOPPER_ENABLED: &str = "hopper.enabled";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_masks_are_disjoint() {
        let masks = [SENSE_LINE, CREDIT_LINE, ALARM_LINE, DIVERTER_LINE];
        for (i, a) in masks.iter().enumerate() {
            for b in &masks[i + 1..] {
                assert_eq!(a & b, 0, "line masks must not overlap");
            }
        }
    }

    #[test]
    fn test_pulse_windows_are_ordered() {
        assert!(SENSE_PULSE_MIN_TICKS < SENSE_PULSE_MAX_TICKS);
        assert!(CREDIT_PULSE_MIN_TICKS < CREDIT_PULSE_MAX_TICKS);
        assert!(ALARM_PULSE_MIN_TICKS < ALARM_PULSE_MAX_TICKS);
        assert!(SENSE_PULSE_MAX_TICKS < SENSE_TO_CREDIT_MAX_TICKS);
        assert!(SENSE_TO_CREDIT_MAX_TICKS < COIN_TRANSIT_TICKS);
    }
}
