//! Unit store
//!
//! Source of truth for which units are currently rendered and where.

use super::types::{ButtonMatrix, Unit, UnitPatch};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// In-memory map from unit uid to unit state
#[derive(Default)]
pub struct UnitStore {
    units: RwLock<HashMap<String, Unit>>,
}

impl UnitStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a unit, replacing any unit with the same uid
    pub fn insert(&self, unit: Unit) -> Option<Unit> {
        self.units.write().insert(unit.uid.clone(), unit)
    }

    /// Get a snapshot of a unit
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<Unit> {
        self.units.read().get(uid).cloned()
    }

    /// Check if a unit exists
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        self.units.read().contains_key(uid)
    }

    /// Merge `patch` into the unit, creating a detached unit if the uid is unknown.
    ///
    /// Returns `true` if the unit already existed.
    pub fn upsert(&self, uid: &str, patch: UnitPatch) -> bool {
        let mut units = self.units.write();
        let existed = units.contains_key(uid);
        if !existed {
            debug!(uid = %uid, "Creating detached unit on upsert");
        }
        let unit = units
            .entry(uid.to_string())
            .or_insert_with(|| Unit::detached(uid));
        patch.apply(unit);
        existed
    }

    /// Replace the stored buttons of an existing unit.
    ///
    /// Returns `false` if the unit does not exist.
    pub fn set_buttons(&self, uid: &str, buttons: ButtonMatrix) -> bool {
        match self.units.write().get_mut(uid) {
            Some(unit) => {
                unit.buttons = buttons;
                true
            }
            None => false,
        }
    }

    /// Remove a unit; removing an absent uid is a no-op
    pub fn remove(&self, uid: &str) -> Option<Unit> {
        self.units.write().remove(uid)
    }

    /// Number of live units
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.read().len()
    }

    /// Returns `true` if no unit is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.read().is_empty()
    }
}
