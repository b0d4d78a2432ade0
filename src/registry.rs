//! Registered deposit addresses.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Maps each deposit address to the user addresses that receive its mix.
///
/// Append-only in practice: deposit addresses are freshly generated UUIDs, so
/// the overwrite on re-register cannot collide.
#[derive(Debug, Default)]
pub struct Registry {
    addrs: RwLock<HashMap<String, Vec<String>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the mapping, replacing any previous registration.
    pub fn register(&self, deposit_addr: String, usr_addrs: Vec<String>) {
        self.addrs.write().insert(deposit_addr, usr_addrs);
    }

    /// Snapshot of all deposit addresses. Order unspecified.
    pub fn deposit_addresses(&self) -> Vec<String> {
        self.addrs.read().keys().cloned().collect()
    }

    /// The user addresses registered for a deposit address, or empty if the
    /// address is not ours.
    pub fn user_addresses(&self, deposit_addr: &str) -> Vec<String> {
        self.addrs
            .read()
            .get(deposit_addr)
            .cloned()
            .unwrap_or_default()
    }
}
