//! Diverter controller: deferred target changes gated on coin transit.
//!
//! The mechanical diverter must never change target while a coin is between
//! the credit optic and the diverter decision point, or the coin would be
//! misrouted. A requested target change is therefore held *pending* and only
//! becomes due once the coin-transit timer has run out.
//!
//! Every divert request resets the transit timer to zero, on the assumption
//! that a coin may be mid-flight at the moment of the request. A caller that
//! re-requests faster than the transit window can therefore defer the change
//! indefinitely; callers are expected to request once and wait.

use coindrop_core::constants::COIN_TRANSIT_TICKS;
use coindrop_core::{AcceptState, DiverterTarget};
use tracing::debug;

/// Confirmed and pending diverter state plus the coin-transit timer.
///
/// Mutated only under the orchestrator's state lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiverterController {
    /// Target the mechanical diverter is currently set to.
    confirmed: DiverterTarget,

    /// Requested target change, not yet applied to the solenoid.
    pending: Option<DiverterTarget>,

    /// Ticks elapsed since the last divert request (or last coin activity
    /// reset), capped at [`COIN_TRANSIT_TICKS`].
    transit_ticks: u64,

    /// Whether the acceptor is accepting or rejecting coins; re-applied to
    /// the reject mechanism whenever a pending divert is applied.
    accept_state: AcceptState,
}

impl DiverterController {
    /// Create a controller with the given initial confirmed target.
    ///
    /// The transit timer starts expired: no coin can be in flight before the
    /// first record is processed.
    pub fn new(initial: DiverterTarget) -> Self {
        Self {
            confirmed: initial,
            pending: None,
            transit_ticks: COIN_TRANSIT_TICKS,
            accept_state: AcceptState::Reject,
        }
    }

    /// Target the mechanical diverter currently reflects.
    pub fn confirmed_target(&self) -> DiverterTarget {
        self.confirmed
    }

    /// Requested target change awaiting transit clearance, if any.
    pub fn pending_target(&self) -> Option<DiverterTarget> {
        self.pending
    }

    /// Current accept/reject policy.
    pub fn accept_state(&self) -> AcceptState {
        self.accept_state
    }

    /// Set the accept/reject policy. The orchestrator keeps the reject
    /// mechanism consistent with this value.
    pub fn set_accept_state(&mut self, state: AcceptState) {
        self.accept_state = state;
    }

    /// True while a coin may still be between the credit optic and the
    /// diverter decision point.
    pub fn coin_in_transit(&self) -> bool {
        self.transit_ticks < COIN_TRANSIT_TICKS
    }

    /// Request a diverter target change.
    ///
    /// If `target` differs from the confirmed target, the change is recorded
    /// as pending and the transit timer restarts; the solenoid is not
    /// touched. Requesting the already-confirmed target cancels any pending
    /// change. A second, opposite request before the timer runs out
    /// overwrites the pending action and restarts the timer again.
    pub fn request_divert(&mut self, target: DiverterTarget) {
        if target == self.confirmed {
            self.pending = None;
            return;
        }
        debug!(%target, "diverter change requested, deferring for coin transit");
        self.pending = Some(target);
        self.transit_ticks = 0;
    }

    /// Accumulate record elapsed time into the transit timer, capped at the
    /// transit threshold.
    pub fn accumulate(&mut self, ticks: u64) {
        if self.transit_ticks < COIN_TRANSIT_TICKS {
            self.transit_ticks = self.transit_ticks.saturating_add(ticks).min(COIN_TRANSIT_TICKS);
        }
    }

    /// The pending target, once no coin is in transit.
    pub fn due_action(&self) -> Option<DiverterTarget> {
        if self.coin_in_transit() {
            None
        } else {
            self.pending
        }
    }

    /// Mark a due target as applied to the mechanism: it becomes the
    /// confirmed target and the pending action clears.
    pub fn confirm(&mut self, target: DiverterTarget) {
        self.confirmed = target;
        self.pending = None;
    }
}
