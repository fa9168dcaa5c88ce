//! Screen registry - stable slot ids for display connectors.
//!
//! Display indices handed out by the windowing layer change whenever a
//! monitor is plugged or unplugged. Panels need something steadier to
//! remember where they live, so each connector name is bound once to an
//! integer slot and the binding is persisted in the `ScreenConnectors`
//! group of the store.
//!
//! # Allocation
//!
//! The first connector seen gets the lowest free slot. Once bound, a slot
//! is never handed to another connector while the store keeps the binding.

use std::collections::{BTreeMap, HashMap};

use berth_core::DisplaySlot;
use tracing::{debug, info, warn};

use crate::store::ConfigStore;

/// Connector name <-> slot bindings.
#[derive(Debug, Default)]
pub struct ScreenRegistry {
    connectors: BTreeMap<DisplaySlot, String>,
    slots: HashMap<String, DisplaySlot>,
    primary_connector: Option<String>,
}

impl ScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the in-memory bindings with those persisted in `store`.
    ///
    /// If a connector was persisted under several slots the lowest one wins.
    pub fn load(&mut self, store: &dyn ConfigStore) {
        self.connectors.clear();
        self.slots.clear();

        for (slot, connector) in store.screen_connectors() {
            if let Some(existing) = self.slots.get(&connector) {
                warn!(
                    connector = %connector,
                    kept = %existing,
                    ignored = %slot,
                    "Connector bound to several slots"
                );
                continue;
            }
            self.slots.insert(connector.clone(), slot);
            self.connectors.insert(slot, connector);
        }

        info!(bindings = self.connectors.len(), "Screen registry loaded");
    }

    /// Returns the slot bound to `connector`, binding the next free slot if
    /// the connector has never been seen. New bindings are synced at once.
    pub fn slot_for(&mut self, connector: &str, store: &mut dyn ConfigStore) -> DisplaySlot {
        if let Some(slot) = self.slots.get(connector) {
            return *slot;
        }

        let slot = self.next_free_slot();
        self.slots.insert(connector.to_string(), slot);
        self.connectors.insert(slot, connector.to_string());

        store.write_screen_connector(slot, connector);
        if let Err(e) = store.sync() {
            warn!(error = %e, connector, "Failed to persist screen binding");
        }

        info!(connector, slot = %slot, "Bound new display connector");
        slot
    }

    /// Looks up a connector's slot without binding a new one.
    pub fn slot_of(&self, connector: &str) -> Option<DisplaySlot> {
        self.slots.get(connector).copied()
    }

    /// Reverse lookup. `None` for the sentinel and for never-bound slots.
    pub fn connector_for(&self, slot: DisplaySlot) -> Option<&str> {
        self.connectors.get(&slot).map(String::as_str)
    }

    /// Records which connector is currently primary. Returns `true` when
    /// the primary connector actually changed.
    pub fn set_primary_connector(&mut self, connector: &str) -> bool {
        if self.primary_connector.as_deref() == Some(connector) {
            return false;
        }
        debug!(
            old = ?self.primary_connector,
            new = connector,
            "Primary connector changed"
        );
        self.primary_connector = Some(connector.to_string());
        true
    }

    pub fn primary_connector(&self) -> Option<&str> {
        self.primary_connector.as_deref()
    }

    /// Slot of the currently primary display, or the sentinel when no
    /// primary display is known yet.
    pub fn primary_slot(&mut self, store: &mut dyn ConfigStore) -> DisplaySlot {
        match self.primary_connector.clone() {
            Some(connector) => self.slot_for(&connector, store),
            None => DisplaySlot::UNASSIGNED,
        }
    }

    fn next_free_slot(&self) -> DisplaySlot {
        let mut candidate = 0;
        for slot in self.connectors.keys() {
            if slot.get() != candidate {
                break;
            }
            candidate += 1;
        }
        DisplaySlot::new(candidate)
    }
}
