//! Pulse signal decoder: change records in, domain events out.
//!
//! Each change record carries the new value of all signal lines plus the
//! elapsed time since the previous transition. A decode pass walks the four
//! logical signals in a fixed, mandatory order — diverter position, sense,
//! credit, alarm — and advances an independent two-phase-plus-fault state
//! machine per pulse-bearing line:
//!
//! - `HighToLow`: the line is idle (high); a low reading starts a pulse and
//!   zeroes that line's width accumulator.
//! - `LowToHigh`: the pulse is active; elapsed time accumulates into the
//!   width. Overrunning the line's maximum width latches the line into
//!   `Fault`; returning high classifies the pulse as noise (below minimum)
//!   or valid.
//! - `Fault`: latched until an explicit reset on re-enable.
//!
//! A valid sense pulse arms the sense/credit correlation; a valid credit
//! pulse consumes one armed sense pulse and confirms a coin, publishing the
//! accepted event plus a routing event comparing the diverter line's live
//! reading against the confirmed target. A credit pulse with no armed sense
//! pulse is an invalid coin; a valid alarm pulse is a coin pulled back out
//! through the optics (yo-yo).
//!
//! The stage order is enforced by a guard token. A violation means the
//! decoder and the device channel are out of sync and the pass is aborted
//! with a fatal [`Error::DecoderDesynchronized`], never silently continued.

use crate::diverter::DiverterController;
use coindrop_channel::ChangeRecord;
use coindrop_core::constants::{
    ALARM_LINE, ALARM_PULSE_MAX_TICKS, ALARM_PULSE_MIN_TICKS, CREDIT_LINE, CREDIT_PULSE_MAX_TICKS,
    CREDIT_PULSE_MIN_TICKS, DIVERTER_LINE, SENSE_LINE, SENSE_PULSE_MAX_TICKS,
    SENSE_PULSE_MIN_TICKS, SENSE_TO_CREDIT_MAX_TICKS, TICK_DIVISOR,
};
use coindrop_core::{CoinEvent, DiverterTarget, Error, FaultKind, Result};
use std::fmt;
use tracing::{debug, trace};

/// Phase of one signal line's pulse state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineState {
    /// Line idle (high); waiting for a pulse to start.
    HighToLow,

    /// Pulse active (line low); accumulating width, waiting for the line to
    /// return high.
    LowToHigh,

    /// Width overran the line's maximum; latched until reset.
    Fault,
}

/// Classification of one record's effect on a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PulseOutcome {
    /// No complete pulse this record (idle, pulse still active, or latched
    /// fault).
    Idle,

    /// Pulse completed below the minimum width; discarded.
    Noise,

    /// Pulse completed inside the valid window.
    Valid,

    /// Width exceeded the maximum; the line just latched into fault.
    Overrun,
}

/// One pulse-bearing line's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineChannel {
    state: LineState,
    width: u64,
}

impl LineChannel {
    fn new() -> Self {
        Self {
            state: LineState::HighToLow,
            width: 0,
        }
    }

    fn step(&mut self, is_high: bool, ticks: u64, min: u64, max: u64) -> PulseOutcome {
        match self.state {
            LineState::HighToLow => {
                if !is_high {
                    self.state = LineState::LowToHigh;
                    self.width = 0;
                }
                PulseOutcome::Idle
            }
            LineState::LowToHigh => {
                self.width = self.width.saturating_add(ticks);
                if self.width > max {
                    self.state = LineState::Fault;
                    return PulseOutcome::Overrun;
                }
                if is_high {
                    self.state = LineState::HighToLow;
                    if self.width < min {
                        PulseOutcome::Noise
                    } else {
                        PulseOutcome::Valid
                    }
                } else {
                    PulseOutcome::Idle
                }
            }
            LineState::Fault => PulseOutcome::Idle,
        }
    }

    fn is_faulted(&self) -> bool {
        self.state == LineState::Fault
    }
}

/// Decode stages in their mandatory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Diverter,
    Sense,
    Credit,
    Alarm,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Per-service decode state, mutated exclusively inside the decode pass
/// under the orchestrator's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CoinEntryState {
    sense: LineChannel,
    credit: LineChannel,
    alarm: LineChannel,

    /// Sense pulses not yet matched by a credit pulse.
    sense_pulses: u32,

    /// Ticks a sense pulse has waited for its companion credit pulse.
    sense_to_credit_ticks: u64,

    /// The diverter line's instantaneous reading for the record currently
    /// being decoded.
    diverting_to: Option<DiverterTarget>,

    /// Guard token: the next stage expected to run.
    stage: Stage,
}

impl CoinEntryState {
    fn new() -> Self {
        Self {
            sense: LineChannel::new(),
            credit: LineChannel::new(),
            alarm: LineChannel::new(),
            sense_pulses: 0,
            sense_to_credit_ticks: 0,
            diverting_to: None,
            stage: Stage::Diverter,
        }
    }

    fn has_fault(&self) -> bool {
        self.sense.is_faulted() || self.credit.is_faulted() || self.alarm.is_faulted()
    }
}

/// The pulse signal decoder.
#[derive(Debug)]
pub struct PulseDecoder {
    entry: CoinEntryState,
    token_value: i64,
}

impl PulseDecoder {
    /// Create a decoder publishing the given token value on every confirmed
    /// coin.
    pub fn new(token_value: i64) -> Self {
        Self {
            entry: CoinEntryState::new(),
            token_value,
        }
    }

    /// True when any line is latched in fault.
    pub fn has_fault(&self) -> bool {
        self.entry.has_fault()
    }

    /// Reset all decode state to initial values.
    ///
    /// Returns true when a latched fault was cleared, so the caller can
    /// publish a fault-cleared event.
    pub fn reset(&mut self) -> bool {
        let had_fault = self.entry.has_fault();
        self.entry = CoinEntryState::new();
        had_fault
    }

    /// Run one decode pass over a change record.
    ///
    /// Events produced by the pass are appended to `events`; the diverter
    /// controller's transit timer advances by the record's elapsed ticks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecoderDesynchronized`] if the stages would run out
    /// of order. This is a fatal internal-consistency failure: the pass is
    /// aborted and the caller must not keep feeding records without a reset.
    pub fn decode(
        &mut self,
        record: &ChangeRecord,
        diverter: &mut DiverterController,
        events: &mut Vec<CoinEvent>,
    ) -> Result<()> {
        let ticks = record.elapsed / TICK_DIVISOR;
        trace!(change_id = record.change_id, value = record.new_value, ticks, "decode pass");

        self.stage_diverter(record, ticks, diverter)?;
        self.stage_sense(record, ticks, events)?;
        self.stage_credit(record, ticks, diverter, events)?;
        self.stage_alarm(record, ticks, events)?;
        Ok(())
    }

    /// Assert the guard token and advance it to the next stage.
    fn enter_stage(&mut self, attempted: Stage, next: Stage) -> Result<()> {
        if self.entry.stage != attempted {
            return Err(Error::desynchronized(
                self.entry.stage.to_string(),
                attempted.to_string(),
            ));
        }
        self.entry.stage = next;
        Ok(())
    }

    fn stage_diverter(
        &mut self,
        record: &ChangeRecord,
        ticks: u64,
        diverter: &mut DiverterController,
    ) -> Result<()> {
        self.enter_stage(Stage::Diverter, Stage::Sense)?;
        self.entry.diverting_to = Some(if record.line_high(DIVERTER_LINE) {
            DiverterTarget::Hopper
        } else {
            DiverterTarget::Cashbox
        });
        diverter.accumulate(ticks);
        Ok(())
    }

    fn stage_sense(
        &mut self,
        record: &ChangeRecord,
        ticks: u64,
        events: &mut Vec<CoinEvent>,
    ) -> Result<()> {
        self.enter_stage(Stage::Sense, Stage::Credit)?;
        match self.entry.sense.step(
            record.line_high(SENSE_LINE),
            ticks,
            SENSE_PULSE_MIN_TICKS,
            SENSE_PULSE_MAX_TICKS,
        ) {
            PulseOutcome::Valid => {
                self.entry.sense_pulses += 1;
                self.entry.sense_to_credit_ticks = 0;
                debug!(pulses = self.entry.sense_pulses, "sense pulse armed");
            }
            PulseOutcome::Overrun => {
                debug!("sense pulse overran maximum width, latching fault");
                events.push(CoinEvent::HardwareFault(FaultKind::Optic));
            }
            PulseOutcome::Noise | PulseOutcome::Idle => {}
        }
        Ok(())
    }

    fn stage_credit(
        &mut self,
        record: &ChangeRecord,
        ticks: u64,
        diverter: &mut DiverterController,
        events: &mut Vec<CoinEvent>,
    ) -> Result<()> {
        self.enter_stage(Stage::Credit, Stage::Alarm)?;

        // Correlation timer: an armed sense pulse only waits so long for its
        // credit pulse. Past the window the arm count is abandoned, so a
        // stale sense pulse can never match an unrelated later credit pulse.
        if self.entry.sense_pulses > 0 {
            self.entry.sense_to_credit_ticks =
                self.entry.sense_to_credit_ticks.saturating_add(ticks);
            if self.entry.sense_to_credit_ticks > SENSE_TO_CREDIT_MAX_TICKS {
                debug!(
                    abandoned = self.entry.sense_pulses,
                    "credit pulse never arrived, abandoning armed sense pulses"
                );
                self.entry.sense_pulses = 0;
            }
        }

        match self.entry.credit.step(
            record.line_high(CREDIT_LINE),
            ticks,
            CREDIT_PULSE_MIN_TICKS,
            CREDIT_PULSE_MAX_TICKS,
        ) {
            PulseOutcome::Valid => {
                if self.entry.sense_pulses > 0 {
                    self.entry.sense_pulses -= 1;
                    events.push(CoinEvent::CoinAccepted {
                        token_value: self.token_value,
                    });
                    let confirmed = diverter.confirmed_target();
                    let sensed = self.entry.diverting_to.unwrap_or(confirmed);
                    events.push(match (sensed, confirmed) {
                        (DiverterTarget::Hopper, DiverterTarget::Hopper) => {
                            CoinEvent::RoutedToHopper
                        }
                        (DiverterTarget::Hopper, DiverterTarget::Cashbox) => {
                            CoinEvent::RoutedToHopperInsteadOfCashbox
                        }
                        (DiverterTarget::Cashbox, DiverterTarget::Cashbox) => {
                            CoinEvent::RoutedToCashbox
                        }
                        (DiverterTarget::Cashbox, DiverterTarget::Hopper) => {
                            CoinEvent::RoutedToCashboxInsteadOfHopper
                        }
                    });
                } else {
                    // Credit with no matching sense pulse: something entered
                    // the credit optic that never passed the entry sensor.
                    events.push(CoinEvent::HardwareFault(FaultKind::Invalid));
                }
            }
            PulseOutcome::Overrun => {
                debug!("credit pulse overran maximum width, latching fault");
                events.push(CoinEvent::HardwareFault(FaultKind::Optic));
            }
            PulseOutcome::Noise | PulseOutcome::Idle => {}
        }
        Ok(())
    }

    fn stage_alarm(
        &mut self,
        record: &ChangeRecord,
        ticks: u64,
        events: &mut Vec<CoinEvent>,
    ) -> Result<()> {
        self.enter_stage(Stage::Alarm, Stage::Diverter)?;
        match self.entry.alarm.step(
            record.line_high(ALARM_LINE),
            ticks,
            ALARM_PULSE_MIN_TICKS,
            ALARM_PULSE_MAX_TICKS,
        ) {
            PulseOutcome::Valid => {
                // A coin pulled back out through the entry optics.
                events.push(CoinEvent::HardwareFault(FaultKind::YoYo));
            }
            PulseOutcome::Overrun => {
                debug!("alarm pulse overran maximum width, latching fault");
                events.push(CoinEvent::HardwareFault(FaultKind::Optic));
            }
            PulseOutcome::Noise | PulseOutcome::Idle => {}
        }
        Ok(())
    }
}
