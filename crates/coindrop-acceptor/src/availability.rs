//! Availability manager: disable-reason accumulation and remedy-based enable.
//!
//! Multiple independent sources (service layer, configuration, operator,
//! backend host, the device itself, game play, internal errors) can disable
//! the acceptor; it is enabled only while no reason is outstanding. An enable
//! request clears exactly the remedy subset its [`EnableReason`] maps to —
//! enabling with `Operator` while the system also holds a disable leaves the
//! acceptor disabled.
//!
//! The manager is pure bitmask arithmetic with no I/O. Every mutation returns
//! a [`MechanismAction`] telling the orchestrator what to do with the reject
//! mechanism; the orchestrator applies it through the adapter.

use coindrop_core::{DisabledReasons, EnableReason};
use tracing::{debug, info};

/// Reject-mechanism side effect of an availability mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MechanismAction {
    /// Energize the reject mechanism (coins fall to the return cup).
    RejectOn,

    /// Release the reject mechanism (coins are accepted).
    RejectOff,

    /// No mechanism change required.
    None,
}

/// Accumulated disable reasons and the derived enabled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvailabilityManager {
    initialized: bool,
    enabled: bool,
    disabled: DisabledReasons,
}

impl AvailabilityManager {
    /// Create a manager that starts disabled by the service layer; the first
    /// successful `Service` enable brings the acceptor up.
    pub fn new() -> Self {
        Self {
            initialized: false,
            enabled: false,
            disabled: DisabledReasons::SERVICE,
        }
    }

    /// Mark the underlying device as initialized. Enable requests fail until
    /// this is called.
    pub fn set_initialized(&mut self, initialized: bool) {
        self.initialized = initialized;
    }

    /// True while no disable reason is outstanding.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The outstanding disable reasons.
    pub fn disabled_reasons(&self) -> DisabledReasons {
        self.disabled
    }

    /// Add disable reasons.
    ///
    /// Reasons already implied by the current disabled state are skipped; if
    /// nothing new was added the call is a no-op and requires no mechanism
    /// change. Otherwise the acceptor becomes disabled and the reject
    /// mechanism must be forced on.
    pub fn disable(&mut self, reasons: DisabledReasons) -> MechanismAction {
        let added = reasons.difference(self.disabled);
        if added.is_empty() {
            return MechanismAction::None;
        }
        self.disabled = self.disabled.union(reasons);
        self.enabled = false;
        info!(reasons = %self.disabled, "coin acceptor disabled");
        MechanismAction::RejectOn
    }

    /// Attempt to enable by remedying the subset of disable reasons mapped
    /// to `reason`.
    ///
    /// Returns whether the acceptor is enabled afterwards, plus the
    /// mechanism action to apply. Before initialization the request fails
    /// and the reject mechanism stays forced on. A request while already
    /// enabled re-applies the enabling side effect (reject off).
    pub fn enable(&mut self, reason: EnableReason) -> (bool, MechanismAction) {
        if !self.initialized {
            debug!(%reason, "enable requested before initialization");
            self.enabled = false;
            return (false, MechanismAction::RejectOn);
        }
        if self.enabled {
            return (true, MechanismAction::RejectOff);
        }

        self.disabled = self.disabled.difference(reason.remedies());
        self.enabled = self.disabled.is_empty();
        if self.enabled {
            info!(%reason, "coin acceptor enabled");
            (true, MechanismAction::RejectOff)
        } else {
            debug!(%reason, remaining = %self.disabled, "enable remedied a subset, still disabled");
            (false, MechanismAction::None)
        }
    }
}

impl Default for AvailabilityManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn initialized() -> AvailabilityManager {
        let mut manager = AvailabilityManager::new();
        manager.set_initialized(true);
        manager
    }

    #[test]
    fn test_starts_disabled_by_service() {
        let manager = AvailabilityManager::new();
        assert!(!manager.is_enabled());
        assert_eq!(manager.disabled_reasons(), DisabledReasons::SERVICE);
    }

    #[test]
    fn test_enable_before_initialization_fails() {
        let mut manager = AvailabilityManager::new();
        let (enabled, action) = manager.enable(EnableReason::Service);
        assert!(!enabled);
        assert_eq!(action, MechanismAction::RejectOn);
    }

    #[test]
    fn test_service_enable_brings_acceptor_up() {
        let mut manager = initialized();
        let (enabled, action) = manager.enable(EnableReason::Service);
        assert!(enabled);
        assert_eq!(action, MechanismAction::RejectOff);
        assert!(manager.disabled_reasons().is_empty());
    }

    #[test]
    fn test_enable_while_enabled_reapplies_side_effect() {
        let mut manager = initialized();
        manager.enable(EnableReason::Service);
        let (enabled, action) = manager.enable(EnableReason::Backend);
        assert!(enabled);
        assert_eq!(action, MechanismAction::RejectOff);
    }

    #[test]
    fn test_disable_is_idempotent() {
        let mut manager = initialized();
        manager.enable(EnableReason::Service);

        assert_eq!(
            manager.disable(DisabledReasons::OPERATOR),
            MechanismAction::RejectOn
        );
        // Same reason again adds nothing and needs no mechanism change.
        assert_eq!(
            manager.disable(DisabledReasons::OPERATOR),
            MechanismAction::None
        );
    }

    #[test]
    fn test_enable_clears_only_the_remedy_subset() {
        let mut manager = initialized();
        manager.enable(EnableReason::Service);
        manager.disable(DisabledReasons::OPERATOR.union(DisabledReasons::SYSTEM));

        // Operator remedies {Operator, Error, FirmwareUpdate}; System stays.
        let (enabled, action) = manager.enable(EnableReason::Operator);
        assert!(!enabled);
        assert_eq!(action, MechanismAction::None);
        assert_eq!(manager.disabled_reasons(), DisabledReasons::SYSTEM);

        let (enabled, action) = manager.enable(EnableReason::System);
        assert!(enabled);
        assert_eq!(action, MechanismAction::RejectOff);
    }

    #[test]
    fn test_operator_enable_clears_error_and_firmware_update() {
        let mut manager = initialized();
        manager.enable(EnableReason::Service);
        manager.disable(DisabledReasons::ERROR.union(DisabledReasons::FIRMWARE_UPDATE));

        let (enabled, _) = manager.enable(EnableReason::Operator);
        assert!(enabled);
    }

    #[test]
    fn test_device_enable_clears_error_but_not_operator() {
        let mut manager = initialized();
        manager.enable(EnableReason::Service);
        manager.disable(DisabledReasons::DEVICE.union(DisabledReasons::ERROR));
        manager.disable(DisabledReasons::OPERATOR);

        let (enabled, _) = manager.enable(EnableReason::Device);
        assert!(!enabled);
        assert_eq!(manager.disabled_reasons(), DisabledReasons::OPERATOR);
    }
}
