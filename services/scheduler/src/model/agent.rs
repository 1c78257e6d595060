//! Agent capacity snapshots and allocation records.

use serde::{Deserialize, Serialize};
use sokovan_id::{AgentId, KernelId, ScalingGroup};
use sokovan_resources::ResourceSlot;

/// A point-in-time view of one agent's capacity.
///
/// Owned by the repository; the scheduler reads a consistent snapshot per
/// attempt and never mutates agent rows directly. Within one tick the
/// selector tracks tentative occupancy on its own copy so that earlier
/// (higher-priority) workloads keep their claim on capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_id: AgentId,
    pub scaling_group: ScalingGroup,
    /// CPU architecture the agent runs, matched against image architecture.
    pub architecture: String,
    /// Total slots the agent can hold.
    pub available_slots: ResourceSlot,
    /// Slots currently committed to kernels.
    pub occupied_slots: ResourceSlot,
    pub schedulable: bool,
    /// Topology hint; kernels of one session prefer agents sharing a zone.
    pub affinity_zone: Option<String>,
}

impl AgentInfo {
    /// Capacity still free on this agent.
    #[must_use]
    pub fn remaining_slots(&self) -> ResourceSlot {
        self.available_slots.saturating_sub(&self.occupied_slots)
    }

    /// True if `demand` fits in the remaining capacity.
    #[must_use]
    pub fn can_fit(&self, demand: &ResourceSlot) -> bool {
        demand.fits_in(&self.remaining_slots())
    }
}

/// One kernel's committed (or tentative) placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelAllocation {
    pub kernel_id: KernelId,
    pub agent_id: AgentId,
    pub allocated_slots: ResourceSlot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sokovan_resources::SlotName;

    fn slots(pairs: &[(&str, u64)]) -> ResourceSlot {
        pairs
            .iter()
            .map(|(k, v)| (SlotName::parse(k).unwrap(), Decimal::from(*v)))
            .collect()
    }

    #[test]
    fn remaining_and_fit() {
        let agent = AgentInfo {
            agent_id: AgentId::new(),
            scaling_group: ScalingGroup::parse("default").unwrap(),
            architecture: "x86_64".to_string(),
            available_slots: slots(&[("cpu", 4), ("mem", 8192)]),
            occupied_slots: slots(&[("cpu", 3)]),
            schedulable: true,
            affinity_zone: None,
        };
        assert_eq!(agent.remaining_slots(), slots(&[("cpu", 1), ("mem", 8192)]));
        assert!(agent.can_fit(&slots(&[("cpu", 1), ("mem", 4096)])));
        assert!(!agent.can_fit(&slots(&[("cpu", 2)])));
    }
}
