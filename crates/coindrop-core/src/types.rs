//! Domain types shared across the coin-acceptor subsystem.
//!
//! This module defines the published event vocabulary, the diverter routing
//! targets, and the disable/enable reason bitset with its remedy table. These
//! are pure values; the engine crates give them behavior.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Routing target of the mechanical coin diverter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiverterTarget {
    /// Route accepted coins to the hopper (available for payouts).
    Hopper,

    /// Route accepted coins to the cashbox (banked drop).
    Cashbox,
}

impl DiverterTarget {
    /// The opposite routing target.
    pub fn other(self) -> Self {
        match self {
            Self::Hopper => Self::Cashbox,
            Self::Cashbox => Self::Hopper,
        }
    }
}

impl fmt::Display for DiverterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hopper => write!(f, "Hopper"),
            Self::Cashbox => write!(f, "Cashbox"),
        }
    }
}

/// Whether the acceptor is currently accepting or rejecting coins.
///
/// `Reject` means the reject mechanism is energized and inserted coins fall
/// straight through to the return cup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptState {
    Accept,
    Reject,
}

/// Category of a recoverable hardware fault published on the event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A pulse overran its maximum width: a coin is jammed in an optic.
    Optic,

    /// A credit pulse arrived with no matching sense pulse: invalid coin.
    Invalid,

    /// A coin was pulled back out through the entry optics on a string.
    YoYo,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optic => write!(f, "Optic"),
            Self::Invalid => write!(f, "Invalid"),
            Self::YoYo => write!(f, "YoYo"),
        }
    }
}

/// Domain events published by the coin acceptor service.
///
/// Events are fire-and-forget and published at most once per physical
/// occurrence; consumers (metering, host protocol, lockup handling) live
/// outside this subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CoinEvent {
    /// A coin passed both optics and was accepted.
    CoinAccepted {
        /// Configured value of the token in the smallest currency unit.
        token_value: i64,
    },

    /// Accepted coin routed to the hopper, matching the confirmed target.
    RoutedToHopper,

    /// Accepted coin routed to the hopper while the confirmed target was the
    /// cashbox: the diverter position disagreed with the commanded state.
    RoutedToHopperInsteadOfCashbox,

    /// Accepted coin routed to the cashbox, matching the confirmed target.
    RoutedToCashbox,

    /// Accepted coin routed to the cashbox while the confirmed target was
    /// the hopper.
    RoutedToCashboxInsteadOfHopper,

    /// A recoverable hardware fault was detected.
    HardwareFault(FaultKind),

    /// Previously reported hardware faults were cleared by a reset.
    HardwareFaultCleared,
}

// ============================================================================
// Disable / enable reasons
// ============================================================================

/// Set of independently-settable reasons the acceptor is disabled.
///
/// This is an explicit bitset rather than a `bitflags` macro type so that the
/// union / remedy-subtraction operations the availability rules need are
/// spelled out and unit-testable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisabledReasons(u16);

impl DisabledReasons {
    /// Disabled by the platform service layer.
    pub const SERVICE: Self = Self(1 << 0);
    /// Disabled by persisted configuration.
    pub const CONFIGURATION: Self = Self(1 << 1);
    /// Disabled by an operator (attendant key / audit menu).
    pub const OPERATOR: Self = Self(1 << 2);
    /// Disabled by the wider system (door open, lockup).
    pub const SYSTEM: Self = Self(1 << 3);
    /// Disabled by the backend host.
    pub const BACKEND: Self = Self(1 << 4);
    /// Disabled because the device failed or is absent.
    pub const DEVICE: Self = Self(1 << 5);
    /// Disabled during active game play.
    pub const GAME_PLAY: Self = Self(1 << 6);
    /// Disabled by an internal error condition.
    pub const ERROR: Self = Self(1 << 7);
    /// Disabled while a firmware update is in progress.
    pub const FIRMWARE_UPDATE: Self = Self(1 << 8);

    /// The empty set.
    pub const fn none() -> Self {
        Self(0)
    }

    /// Raw bit representation.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// True when no reason is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Union of two reason sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Reasons in `self` that are not in `other`.
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// True when every reason in `other` is already set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when the two sets share at least one reason.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl fmt::Display for DisabledReasons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(none)");
        }
        let names = [
            (Self::SERVICE, "Service"),
            (Self::CONFIGURATION, "Configuration"),
            (Self::OPERATOR, "Operator"),
            (Self::SYSTEM, "System"),
            (Self::BACKEND, "Backend"),
            (Self::DEVICE, "Device"),
            (Self::GAME_PLAY, "GamePlay"),
            (Self::ERROR, "Error"),
            (Self::FIRMWARE_UPDATE, "FirmwareUpdate"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.intersects(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Source asking for the acceptor to be re-enabled.
///
/// Each enable reason remedies a fixed subset of [`DisabledReasons`]; the
/// acceptor only becomes enabled again once every outstanding disable reason
/// has been remedied by some source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnableReason {
    Service,
    Configuration,
    Operator,
    System,
    Backend,
    Device,
    GamePlay,
}

impl EnableReason {
    /// The disable reasons this enable source remedies.
    ///
    /// An operator enable clears operator locks and also the error and
    /// firmware-update conditions, since those are resolved at the machine by
    /// an attendant. A device enable (device came back) also clears the error
    /// flag that its failure raised. Every other source remedies only its own
    /// flag.
    pub fn remedies(self) -> DisabledReasons {
        match self {
            Self::Service => DisabledReasons::SERVICE,
            Self::Configuration => DisabledReasons::CONFIGURATION,
            Self::Operator => DisabledReasons::OPERATOR
                .union(DisabledReasons::ERROR)
                .union(DisabledReasons::FIRMWARE_UPDATE),
            Self::System => DisabledReasons::SYSTEM,
            Self::Backend => DisabledReasons::BACKEND,
            Self::Device => DisabledReasons::DEVICE.union(DisabledReasons::ERROR),
            Self::GamePlay => DisabledReasons::GAME_PLAY,
        }
    }
}

impl fmt::Display for EnableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
