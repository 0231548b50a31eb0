//! Named-property access for persisted configuration.
//!
//! The platform persists configuration as key/value properties; this
//! subsystem only reads three of them, once, at initialization. The
//! [`PropertyStore`] trait is the seam the platform's real store plugs into;
//! [`MemoryProperties`] is the in-memory implementation used by tests and the
//! emulated cabinet.

use coindrop_core::constants::{
    DEFAULT_TOKEN_VALUE, PROP_ACCEPTOR_ENABLED, PROP_HOPPER_ENABLED, PROP_TOKEN_VALUE,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read-only access to named configuration properties.
pub trait PropertyStore: Send + Sync {
    /// Integer property value, if present.
    fn integer(&self, key: &str) -> Option<i64>;

    /// Boolean property value, if present.
    fn flag(&self, key: &str) -> Option<bool>;
}

/// In-memory property store.
#[derive(Debug, Default, Clone)]
pub struct MemoryProperties {
    integers: HashMap<String, i64>,
    flags: HashMap<String, bool>,
}

impl MemoryProperties {
    /// Create an empty store; every lookup falls back to its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an integer property.
    pub fn with_integer(mut self, key: impl Into<String>, value: i64) -> Self {
        self.integers.insert(key.into(), value);
        self
    }

    /// Set a boolean property.
    pub fn with_flag(mut self, key: impl Into<String>, value: bool) -> Self {
        self.flags.insert(key.into(), value);
        self
    }
}

impl PropertyStore for MemoryProperties {
    fn integer(&self, key: &str) -> Option<i64> {
        self.integers.get(key).copied()
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.flags.get(key).copied()
    }
}

/// The configuration snapshot the coin acceptor service reads at
/// initialization. Values are cached for the life of the service; property
/// changes require re-initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptorProperties {
    /// Monetary value of one accepted token, smallest currency unit.
    pub token_value: i64,

    /// Whether coin acceptance is enabled by configuration. When false the
    /// service stops device polling at initialization and never starts its
    /// run loop.
    pub acceptor_enabled: bool,

    /// Whether the hopper is present and enabled; selects the initial
    /// diverter target (hopper when true, cashbox otherwise).
    pub hopper_enabled: bool,
}

impl AcceptorProperties {
    /// Load the snapshot from a property store, applying defaults for
    /// missing keys.
    pub fn load(store: &impl PropertyStore) -> Self {
        Self {
            token_value: store.integer(PROP_TOKEN_VALUE).unwrap_or(DEFAULT_TOKEN_VALUE),
            acceptor_enabled: store.flag(PROP_ACCEPTOR_ENABLED).unwrap_or(false),
            hopper_enabled: store.flag(PROP_HOPPER_ENABLED).unwrap_or(true),
        }
    }
}
