//! Fair-share calculation.
//!
//! Turns historical per-entity usage buckets into a single priority scalar
//! in `[0, 1]`. The factor is re-derived periodically by
//! [`FairShareRecalculator`] and cached; the scheduling path only ever
//! reads the cache.

mod recalc;

pub use recalc::FairShareRecalculator;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sokovan_resources::{ResourceSlot, SlotName};

use crate::model::FairShareCalculationSnapshot;

/// Per-entity fair-share configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairShareSpec {
    /// Half-life of usage decay, in days.
    pub half_life_days: f64,
    /// How far back usage is considered, in days.
    pub lookback_days: u32,
    /// Number of equal-width buckets covering the lookback window.
    pub num_buckets: u32,
    /// Explicit per-resource weights for the scalar reduction.
    pub resource_weights: ResourceSlot,
    /// Weight applied to resources absent from `resource_weights`.
    pub default_weight: Decimal,
    /// The entity's share weight; larger means a higher factor at equal
    /// usage.
    pub weight: Decimal,
}

impl Default for FairShareSpec {
    fn default() -> Self {
        Self {
            half_life_days: 7.0,
            lookback_days: 28,
            num_buckets: 28,
            resource_weights: ResourceSlot::new(),
            default_weight: Decimal::ONE,
            weight: Decimal::ONE,
        }
    }
}

/// One equal-width usage bucket, owned by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBucket {
    /// Start of the bucket's time range.
    pub start: DateTime<Utc>,
    /// Slot-seconds (or slot-hours; any consistent unit) used in the range.
    pub usage: ResourceSlot,
}

/// The outcome of merging configured weights with the live slot universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedWeights {
    /// Final weight per resource present in `available_slots`.
    pub weights: BTreeMap<SlotName, Decimal>,
    /// Resources that fell back to the default weight.
    pub uses_default: BTreeSet<SlotName>,
}

/// Merges explicit resource weights with the available slot universe.
///
/// Every resource present in `available_slots` gets a weight: the explicit
/// one where configured, `default_weight` otherwise (tracked in
/// `uses_default`). Resources absent from `available_slots` get no weight
/// at all; historical usage of a capacity that no longer exists cannot be
/// weighted against it.
#[must_use]
pub fn merge_weights(
    available_slots: &ResourceSlot,
    row_weights: &ResourceSlot,
    default_weight: Decimal,
) -> MergedWeights {
    let mut weights = BTreeMap::new();
    let mut uses_default = BTreeSet::new();
    for (name, _) in available_slots {
        let explicit = row_weights
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, w)| *w);
        match explicit {
            Some(w) => {
                weights.insert(name.clone(), w);
            }
            None => {
                weights.insert(name.clone(), default_weight);
                uses_default.insert(name.clone());
            }
        }
    }
    MergedWeights {
        weights,
        uses_default,
    }
}

/// Computes one entity's fair-share snapshot from its usage history.
///
/// At most `num_buckets` buckets are considered, newest first. Each
/// bucket's usage is decayed by `0.5 ^ (bucket_age / half_life)`,
/// summed into one decayed-usage vector, reduced to a scalar via the
/// merged weights, normalized against the weighted capacity, and combined
/// with the entity weight as `weight / (weight + usage_ratio)`: zero usage
/// yields 1, heavy usage approaches 0, and a larger entity weight raises
/// the factor at equal usage.
#[must_use]
pub fn compute_snapshot(
    spec: &FairShareSpec,
    buckets: &[UsageBucket],
    available_slots: &ResourceSlot,
    now: DateTime<Utc>,
) -> FairShareCalculationSnapshot {
    let merged = merge_weights(available_slots, &spec.resource_weights, spec.default_weight);

    let considered = &buckets[..buckets.len().min(spec.num_buckets as usize)];
    let mut decayed_usage = ResourceSlot::new();
    for bucket in considered {
        let age_days = (now - bucket.start).num_seconds().max(0) as f64 / 86_400.0;
        let decay = if spec.half_life_days > 0.0 {
            0.5_f64.powf(age_days / spec.half_life_days)
        } else {
            1.0
        };
        let decay = Decimal::from_f64_retain(decay).unwrap_or(Decimal::ZERO);
        let scaled: ResourceSlot = bucket
            .usage
            .iter()
            .map(|(name, value)| (name.clone(), value.checked_mul(decay).unwrap_or(*value)))
            .collect();
        decayed_usage += &scaled;
    }

    let mut usage_scalar = Decimal::ZERO;
    let mut capacity_scalar = Decimal::ZERO;
    for (name, weight) in &merged.weights {
        usage_scalar += *weight * decayed_usage.get(name);
        capacity_scalar += *weight * available_slots.get(name);
    }

    let usage_ratio = usage_scalar
        .checked_div(capacity_scalar)
        .unwrap_or(usage_scalar);

    let factor = spec
        .weight
        .checked_div(spec.weight + usage_ratio)
        .unwrap_or(Decimal::ZERO)
        .clamp(Decimal::ZERO, Decimal::ONE);

    FairShareCalculationSnapshot {
        factor,
        decayed_usage,
        computed_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn slots(pairs: &[(&str, &str)]) -> ResourceSlot {
        pairs
            .iter()
            .map(|(k, v)| (SlotName::parse(k).unwrap(), v.parse::<Decimal>().unwrap()))
            .collect()
    }

    fn name(s: &str) -> SlotName {
        SlotName::parse(s).unwrap()
    }

    #[test]
    fn merge_explicit_wins_default_tracked() {
        let available = slots(&[("cpu", "100"), ("mem", "1000")]);
        let row = slots(&[("cpu", "2.0")]);
        let merged = merge_weights(&available, &row, Decimal::ONE);

        assert_eq!(merged.weights[&name("cpu")], Decimal::from(2));
        assert_eq!(merged.weights[&name("mem")], Decimal::ONE);
        assert_eq!(
            merged.uses_default,
            BTreeSet::from([name("mem")]),
        );
        assert!(!merged.uses_default.contains(&name("cpu")));
    }

    #[test]
    fn merge_drops_resources_without_capacity() {
        let available = slots(&[("cpu", "100")]);
        let row = slots(&[("cpu", "1"), ("cuda.device", "4")]);
        let merged = merge_weights(&available, &row, Decimal::ONE);
        assert!(!merged.weights.contains_key(&name("cuda.device")));
    }

    #[test]
    fn zero_usage_yields_factor_one() {
        let spec = FairShareSpec::default();
        let available = slots(&[("cpu", "100"), ("mem", "1000")]);
        let snap = compute_snapshot(&spec, &[], &available, Utc::now());
        assert_eq!(snap.factor, Decimal::ONE);
        assert!(snap.decayed_usage.is_zero());
    }

    #[test]
    fn heavier_usage_lowers_factor() {
        let spec = FairShareSpec::default();
        let available = slots(&[("cpu", "100")]);
        let now = Utc::now();
        let light = [UsageBucket {
            start: now - Duration::days(1),
            usage: slots(&[("cpu", "10")]),
        }];
        let heavy = [UsageBucket {
            start: now - Duration::days(1),
            usage: slots(&[("cpu", "90")]),
        }];
        let f_light = compute_snapshot(&spec, &light, &available, now).factor;
        let f_heavy = compute_snapshot(&spec, &heavy, &available, now).factor;
        assert!(f_light > f_heavy);
        assert!(f_heavy > Decimal::ZERO);
    }

    #[test]
    fn older_usage_decays_more() {
        let spec = FairShareSpec::default();
        let available = slots(&[("cpu", "100")]);
        let now = Utc::now();
        let usage = slots(&[("cpu", "50")]);
        let recent = [UsageBucket {
            start: now - Duration::days(1),
            usage: usage.clone(),
        }];
        let old = [UsageBucket {
            start: now - Duration::days(21),
            usage,
        }];
        let f_recent = compute_snapshot(&spec, &recent, &available, now).factor;
        let f_old = compute_snapshot(&spec, &old, &available, now).factor;
        assert!(f_old > f_recent, "decayed old usage should penalize less");
    }

    #[rstest]
    #[case("1", "2")]
    #[case("0.5", "1")]
    fn larger_entity_weight_raises_factor(#[case] small: &str, #[case] big: &str) {
        let available = slots(&[("cpu", "100")]);
        let now = Utc::now();
        let buckets = [UsageBucket {
            start: now - Duration::days(2),
            usage: slots(&[("cpu", "40")]),
        }];
        let mut spec = FairShareSpec {
            weight: small.parse().unwrap(),
            ..FairShareSpec::default()
        };
        let f_small = compute_snapshot(&spec, &buckets, &available, now).factor;
        spec.weight = big.parse().unwrap();
        let f_big = compute_snapshot(&spec, &buckets, &available, now).factor;
        assert!(f_big > f_small);
    }

    #[test]
    fn buckets_beyond_the_configured_count_are_ignored() {
        let spec = FairShareSpec {
            num_buckets: 1,
            ..FairShareSpec::default()
        };
        let available = slots(&[("cpu", "100")]);
        let now = Utc::now();
        // Newest first; only the small recent bucket may count.
        let buckets = [
            UsageBucket {
                start: now - Duration::days(1),
                usage: slots(&[("cpu", "10")]),
            },
            UsageBucket {
                start: now - Duration::days(2),
                usage: slots(&[("cpu", "90")]),
            },
        ];
        let capped = compute_snapshot(&spec, &buckets, &available, now);
        let newest_only = compute_snapshot(&spec, &buckets[..1], &available, now);
        assert_eq!(capped.factor, newest_only.factor);
        assert_eq!(capped.decayed_usage, newest_only.decayed_usage);
    }

    #[test]
    fn usage_for_retired_capacity_is_dropped() {
        let spec = FairShareSpec::default();
        // cuda.device capacity no longer exists; only cpu is reduced.
        let available = slots(&[("cpu", "100")]);
        let now = Utc::now();
        let buckets = [UsageBucket {
            start: now - Duration::days(1),
            usage: slots(&[("cuda.device", "1000000")]),
        }];
        let snap = compute_snapshot(&spec, &buckets, &available, now);
        assert_eq!(snap.factor, Decimal::ONE);
    }

    #[test]
    fn factor_stays_in_unit_interval() {
        let spec = FairShareSpec {
            weight: Decimal::from(1000),
            ..FairShareSpec::default()
        };
        let available = slots(&[("cpu", "1")]);
        let now = Utc::now();
        let buckets = [UsageBucket {
            start: now,
            usage: slots(&[("cpu", "999999999")]),
        }];
        let snap = compute_snapshot(&spec, &buckets, &available, now);
        assert!(snap.factor >= Decimal::ZERO && snap.factor <= Decimal::ONE);
    }
}
