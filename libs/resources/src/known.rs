//! Registry of known slot types.
//!
//! Agents advertise device plugins at startup; the repository layer folds
//! those into a registry the scheduler uses to validate requested slots.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::SlotName;

/// Unit class of a slot quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotUnit {
    /// Discrete or fractional device/core counts.
    Count,
    /// Byte quantities (memory, shared memory).
    Bytes,
}

/// The set of slot names the cluster currently understands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnownSlotTypes(BTreeMap<SlotName, SlotUnit>);

impl KnownSlotTypes {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The built-in intrinsic slots every agent reports.
    #[must_use]
    pub fn intrinsic() -> Self {
        let mut k = Self::new();
        k.register(SlotName::parse("cpu").expect("static name"), SlotUnit::Count);
        k.register(SlotName::parse("mem").expect("static name"), SlotUnit::Bytes);
        k
    }

    /// Registers a slot name with its unit class.
    pub fn register(&mut self, name: SlotName, unit: SlotUnit) {
        self.0.insert(name, unit);
    }

    /// True if the name is registered.
    #[must_use]
    pub fn contains(&self, name: &SlotName) -> bool {
        self.0.contains_key(name)
    }

    /// Unit class for a registered name.
    #[must_use]
    pub fn unit(&self, name: &SlotName) -> Option<SlotUnit> {
        self.0.get(name).copied()
    }

    /// Iterates over registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &SlotName> {
        self.0.keys()
    }
}
