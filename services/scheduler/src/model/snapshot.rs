//! System-wide snapshots used by prioritizers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sokovan_id::{DomainName, ProjectId, UserId};
use sokovan_resources::ResourceSlot;

/// The entity a fair-share factor is tracked for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FairShareEntity {
    Domain(DomainName),
    Project(ProjectId),
    User(UserId),
}

impl std::fmt::Display for FairShareEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FairShareEntity::Domain(d) => write!(f, "domain/{d}"),
            FairShareEntity::Project(p) => write!(f, "project/{p}"),
            FairShareEntity::User(u) => write!(f, "user/{u}"),
        }
    }
}

/// The cached output of one fair-share recalculation for one entity.
///
/// Written only by the periodic recalculation job; read-only to the
/// scheduler and prioritizers during an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairShareCalculationSnapshot {
    /// Priority scalar in `[0, 1]`; higher schedules earlier.
    pub factor: Decimal,
    /// The decayed usage vector the factor was derived from.
    pub decayed_usage: ResourceSlot,
    pub computed_at: DateTime<Utc>,
}

/// A point-in-time view of allocations and fair-share state for one
/// scaling group's scheduling attempt.
///
/// Taken atomically relative to the attempt it supports. A stale snapshot
/// is not fatal; an over-commit it causes is caught by the repository's
/// atomic allocation commit and surfaces as a conflict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Total capacity across the scaling group's agents.
    pub total_capacity: ResourceSlot,
    /// Currently committed slots per user.
    pub occupancy_by_user: BTreeMap<UserId, ResourceSlot>,
    /// Currently committed slots per project.
    pub occupancy_by_project: BTreeMap<ProjectId, ResourceSlot>,
    /// Cached fair-share factors, keyed by entity.
    pub fair_share: BTreeMap<FairShareEntity, FairShareCalculationSnapshot>,
    pub taken_at: DateTime<Utc>,
}

impl SystemSnapshot {
    /// Cached factor for an entity; entities with no recorded usage rank
    /// at the top.
    #[must_use]
    pub fn factor_for(&self, entity: &FairShareEntity) -> Decimal {
        self.fair_share
            .get(entity)
            .map(|s| s.factor)
            .unwrap_or(Decimal::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_factor_defaults_to_one() {
        let snapshot = SystemSnapshot::default();
        let user = FairShareEntity::User(UserId::new());
        assert_eq!(snapshot.factor_for(&user), Decimal::ONE);
    }
}
