//! The `ResourceSlot` vector type and its arithmetic.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Add, AddAssign, Sub};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{KnownSlotTypes, SlotError};

/// Sentinel quantity for "unlimited" policies.
///
/// Stored and serialized like any other quantity; arithmetic saturates at
/// this value instead of overflowing.
pub const UNLIMITED: Decimal = Decimal::MAX;

/// A resource slot name, e.g. `cpu`, `mem`, `cuda.device`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotName(String);

impl SlotName {
    /// Maximum name length in bytes.
    pub const MAX_LEN: usize = 64;

    /// Parses and validates a slot name.
    ///
    /// Accepts ASCII alphanumerics plus `._-:/` (device slots use dotted
    /// names like `cuda.shares`).
    pub fn parse(s: &str) -> Result<Self, SlotError> {
        if s.is_empty()
            || s.len() > Self::MAX_LEN
            || !s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':' | '/'))
        {
            return Err(SlotError::InvalidSlotName(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SlotName {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SlotName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SlotName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// An ordered mapping from slot name to a decimal quantity.
///
/// The canonical serialized form is a string-keyed decimal map; decimals
/// serialize as strings so round-trips are exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceSlot(BTreeMap<SlotName, Decimal>);

impl ResourceSlot {
    /// Creates an empty slot vector.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the quantity for a name, zero if absent.
    #[must_use]
    pub fn get(&self, name: &SlotName) -> Decimal {
        self.0.get(name).copied().unwrap_or(Decimal::ZERO)
    }

    /// Sets the quantity for a name.
    pub fn insert(&mut self, name: SlotName, quantity: Decimal) {
        self.0.insert(name, quantity);
    }

    /// Iterates over (name, quantity) pairs in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, SlotName, Decimal> {
        self.0.iter()
    }

    /// Iterates over slot names in order.
    pub fn names(&self) -> btree_map::Keys<'_, SlotName, Decimal> {
        self.0.keys()
    }

    /// Number of named entries (including explicit zeros).
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every entry is zero (or the vector is empty).
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|q| q.is_zero())
    }

    /// The union of slot names across both vectors.
    #[must_use]
    pub fn union_names<'a>(&'a self, other: &'a ResourceSlot) -> BTreeSet<&'a SlotName> {
        self.0.keys().chain(other.0.keys()).collect()
    }

    /// Element-wise `self[k] <= other[k]` over the union of names.
    #[must_use]
    pub fn le(&self, other: &ResourceSlot) -> bool {
        self.union_names(other)
            .into_iter()
            .all(|k| self.get(k) <= other.get(k))
    }

    /// Element-wise `self[k] >= other[k]` over the union of names.
    #[must_use]
    pub fn ge(&self, other: &ResourceSlot) -> bool {
        other.le(self)
    }

    /// True if this demand fits within the given capacity.
    ///
    /// Alias for [`le`](Self::le); placement code reads better with it.
    #[must_use]
    pub fn fits_in(&self, capacity: &ResourceSlot) -> bool {
        self.le(capacity)
    }

    /// Element-wise subtraction clamped at zero per component.
    #[must_use]
    pub fn saturating_sub(&self, other: &ResourceSlot) -> ResourceSlot {
        let mut out = BTreeMap::new();
        for k in self.union_names(other) {
            let v = (self.get(k) - other.get(k)).max(Decimal::ZERO);
            out.insert(k.clone(), v);
        }
        ResourceSlot(out)
    }

    /// Returns true if any component is negative.
    #[must_use]
    pub fn has_negative(&self) -> bool {
        self.0.values().any(|q| q.is_sign_negative() && !q.is_zero())
    }

    /// Validates the vector against the registered slot types.
    ///
    /// Zero-valued unknown entries are dropped. A non-zero unknown entry is
    /// an `UnsupportedResource` error unless `ignore_unknown` is set, in
    /// which case it is dropped too.
    pub fn normalize(
        &self,
        known: &KnownSlotTypes,
        ignore_unknown: bool,
    ) -> Result<ResourceSlot, SlotError> {
        let mut out = BTreeMap::new();
        let mut unsupported = Vec::new();
        for (name, quantity) in &self.0 {
            if known.contains(name) {
                out.insert(name.clone(), *quantity);
            } else if !quantity.is_zero() {
                if !ignore_unknown {
                    unsupported.push(name.clone());
                }
                // dropped when ignoring
            }
            // zero-valued unknown entries are always dropped
        }
        if !unsupported.is_empty() {
            return Err(SlotError::UnsupportedResource { names: unsupported });
        }
        Ok(ResourceSlot(out))
    }

    /// Rejects vectors with any negative component.
    pub fn require_non_negative(&self) -> Result<(), SlotError> {
        for (name, quantity) in &self.0 {
            if quantity.is_sign_negative() && !quantity.is_zero() {
                return Err(SlotError::NegativeQuantity { name: name.clone() });
            }
        }
        Ok(())
    }
}

impl FromIterator<(SlotName, Decimal)> for ResourceSlot {
    fn from_iter<T: IntoIterator<Item = (SlotName, Decimal)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ResourceSlot {
    type Item = (&'a SlotName, &'a Decimal);
    type IntoIter = btree_map::Iter<'a, SlotName, Decimal>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// Addition saturates at UNLIMITED so sentinel quantities never overflow.
fn saturating_add(a: Decimal, b: Decimal) -> Decimal {
    a.checked_add(b).unwrap_or(UNLIMITED)
}

impl Add for &ResourceSlot {
    type Output = ResourceSlot;

    fn add(self, rhs: &ResourceSlot) -> ResourceSlot {
        let mut out = BTreeMap::new();
        for k in self.union_names(rhs) {
            out.insert(k.clone(), saturating_add(self.get(k), rhs.get(k)));
        }
        ResourceSlot(out)
    }
}

impl AddAssign<&ResourceSlot> for ResourceSlot {
    fn add_assign(&mut self, rhs: &ResourceSlot) {
        for (k, v) in &rhs.0 {
            let cur = self.get(k);
            self.0.insert(k.clone(), saturating_add(cur, *v));
        }
    }
}

impl Sub for &ResourceSlot {
    type Output = ResourceSlot;

    /// Element-wise subtraction. Negative components are a valid
    /// intermediate result; see [`ResourceSlot::require_non_negative`].
    fn sub(self, rhs: &ResourceSlot) -> ResourceSlot {
        let mut out = BTreeMap::new();
        for k in self.union_names(rhs) {
            out.insert(k.clone(), self.get(k) - rhs.get(k));
        }
        ResourceSlot(out)
    }
}

impl<'a> std::iter::Sum<&'a ResourceSlot> for ResourceSlot {
    fn sum<I: Iterator<Item = &'a ResourceSlot>>(iter: I) -> Self {
        let mut acc = ResourceSlot::new();
        for s in iter {
            acc += s;
        }
        acc
    }
}

impl std::fmt::Display for ResourceSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlotUnit;
    use proptest::prelude::*;

    fn slot(pairs: &[(&str, &str)]) -> ResourceSlot {
        pairs
            .iter()
            .map(|(k, v)| (SlotName::parse(k).unwrap(), v.parse::<Decimal>().unwrap()))
            .collect()
    }

    fn known() -> KnownSlotTypes {
        let mut k = KnownSlotTypes::new();
        k.register(SlotName::parse("cpu").unwrap(), SlotUnit::Count);
        k.register(SlotName::parse("mem").unwrap(), SlotUnit::Bytes);
        k.register(SlotName::parse("cuda.device").unwrap(), SlotUnit::Count);
        k
    }

    #[test]
    fn absent_key_is_zero() {
        let s = slot(&[("cpu", "2")]);
        assert_eq!(s.get(&SlotName::parse("mem").unwrap()), Decimal::ZERO);
    }

    #[test]
    fn add_and_sub_over_union() {
        let a = slot(&[("cpu", "2"), ("mem", "1024")]);
        let b = slot(&[("cpu", "1"), ("cuda.device", "1")]);
        let sum = &a + &b;
        assert_eq!(sum, slot(&[("cpu", "3"), ("mem", "1024"), ("cuda.device", "1")]));
        let diff = &a - &b;
        assert_eq!(
            diff,
            slot(&[("cpu", "1"), ("mem", "1024"), ("cuda.device", "-1")])
        );
        assert!(diff.has_negative());
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        let a = slot(&[("cpu", "1")]);
        let b = slot(&[("cpu", "3"), ("mem", "2")]);
        assert_eq!(a.saturating_sub(&b), slot(&[("cpu", "0"), ("mem", "0")]));
    }

    #[test]
    fn comparison_over_union() {
        let demand = slot(&[("cpu", "2"), ("mem", "4096")]);
        let capacity = slot(&[("cpu", "4"), ("mem", "8192"), ("cuda.device", "2")]);
        assert!(demand.fits_in(&capacity));
        assert!(capacity.ge(&demand));
        assert!(!capacity.le(&demand));

        let too_big = slot(&[("cpu", "8")]);
        assert!(!too_big.fits_in(&capacity));
    }

    #[test]
    fn unlimited_addition_saturates() {
        let mut a = ResourceSlot::new();
        a.insert(SlotName::parse("cpu").unwrap(), UNLIMITED);
        let b = slot(&[("cpu", "1")]);
        let sum = &a + &b;
        assert_eq!(sum.get(&SlotName::parse("cpu").unwrap()), UNLIMITED);
    }

    #[test]
    fn normalize_drops_zero_unknown() {
        let s = slot(&[("cpu", "2"), ("tpu.device", "0")]);
        let n = s.normalize(&known(), false).unwrap();
        assert_eq!(n, slot(&[("cpu", "2")]));
    }

    #[test]
    fn normalize_rejects_nonzero_unknown() {
        let s = slot(&[("cpu", "2"), ("tpu.device", "1")]);
        let err = s.normalize(&known(), false).unwrap_err();
        assert!(matches!(err, SlotError::UnsupportedResource { ref names }
            if names.len() == 1 && names[0].as_str() == "tpu.device"));
    }

    #[test]
    fn normalize_ignore_unknown_drops_silently() {
        let s = slot(&[("cpu", "2"), ("tpu.device", "1")]);
        let n = s.normalize(&known(), true).unwrap();
        assert_eq!(n, slot(&[("cpu", "2")]));
    }

    #[test]
    fn sum_over_kernels() {
        let kernels = [slot(&[("cpu", "1")]), slot(&[("cpu", "2"), ("mem", "512")])];
        let total: ResourceSlot = kernels.iter().sum();
        assert_eq!(total, slot(&[("cpu", "3"), ("mem", "512")]));
    }

    #[test]
    fn serde_roundtrip_with_sentinel() {
        let mut s = slot(&[("cpu", "2.5"), ("mem", "8589934592")]);
        s.insert(SlotName::parse("cuda.device").unwrap(), UNLIMITED);
        let json = serde_json::to_string(&s).unwrap();
        let back: ResourceSlot = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    proptest! {
        #[test]
        fn prop_serde_roundtrip(
            entries in proptest::collection::btree_map(
                "[a-z][a-z0-9.]{0,15}",
                (0u64..=u64::MAX, 0u32..=9u32),
                0..6,
            )
        ) {
            let s: ResourceSlot = entries
                .into_iter()
                .map(|(k, (mantissa, scale))| {
                    (
                        SlotName::parse(&k).unwrap(),
                        Decimal::try_from_i128_with_scale(mantissa as i128, scale)
                            .unwrap_or(UNLIMITED),
                    )
                })
                .collect();
            let json = serde_json::to_string(&s).unwrap();
            let back: ResourceSlot = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(s, back);
        }

        #[test]
        fn prop_add_then_sub_identity(
            a in 0u64..1_000_000, b in 0u64..1_000_000,
        ) {
            let name = SlotName::parse("cpu").unwrap();
            let mut x = ResourceSlot::new();
            x.insert(name.clone(), Decimal::from(a));
            let mut y = ResourceSlot::new();
            y.insert(name.clone(), Decimal::from(b));
            let roundtrip = &(&x + &y) - &y;
            prop_assert_eq!(roundtrip.get(&name), Decimal::from(a));
        }
    }
}
