//! Agent selection and tentative allocation.
//!
//! Given one workload (already decomposed into per-kernel slot demands)
//! and a set of agent capacity snapshots, pick concrete agents and record
//! a tentative reservation. Placement is all-or-nothing across a
//! workload's kernels: either every kernel gets an agent or the workload
//! fails as a unit.
//!
//! Failures are values, not errors: resource insufficiency is transient
//! (the scheduler maps it to need-retry), a policy violation is permanent.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sokovan_resources::{ResourceSlot, SlotName};
use tracing::trace;

use crate::model::{AgentInfo, ClusterMode, KernelAllocation, KernelWorkload, SessionWorkload};

/// Agent packing strategy, configurable per scaling group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Pick the agent with the least remaining capacity after allocation,
    /// packing tightly to keep other agents free for larger jobs.
    Concentrated,
    /// Pick the agent with the most remaining capacity, spreading load.
    Dispersed,
}

/// Why a workload could not be placed.
#[derive(Debug, Clone, PartialEq)]
pub enum AllocationFailure {
    /// No agent currently has capacity for some kernel. Transient.
    ResourceInsufficient { demand: ResourceSlot },
    /// The request can never be satisfied as stated. Permanent.
    PolicyViolation { reason: String },
}

impl std::fmt::Display for AllocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationFailure::ResourceInsufficient { demand } => {
                write!(f, "insufficient resources for {demand}")
            }
            AllocationFailure::PolicyViolation { reason } => {
                write!(f, "policy violation: {reason}")
            }
        }
    }
}

/// Picks agents for workloads and tracks tentative occupancy.
#[derive(Debug, Clone)]
pub struct AgentSelector {
    strategy: SelectionStrategy,
    allow_fragmentation: bool,
}

impl AgentSelector {
    /// Creates a selector with the scaling group's configured policy.
    #[must_use]
    pub fn new(strategy: SelectionStrategy, allow_fragmentation: bool) -> Self {
        Self {
            strategy,
            allow_fragmentation,
        }
    }

    /// Places every kernel of `workload` onto agents from `agents`.
    ///
    /// On success the chosen agents' occupied slots are bumped in place so
    /// that later workloads in the same tick see the tentative
    /// consumption; on failure `agents` is left untouched.
    pub fn select(
        &self,
        workload: &SessionWorkload,
        agents: &mut [AgentInfo],
    ) -> Result<Vec<KernelAllocation>, AllocationFailure> {
        self.validate(workload, agents)?;

        let placements = match workload.cluster_mode {
            ClusterMode::SingleNode => self.place_single_node(workload, agents)?,
            ClusterMode::MultiNode => self.place_multi_node(workload, agents)?,
        };

        // All kernels placed: apply the tentative occupancy.
        for (agent_idx, kernel) in &placements {
            agents[*agent_idx].occupied_slots += &kernel.requested_slots;
        }

        Ok(placements
            .into_iter()
            .map(|(agent_idx, kernel)| KernelAllocation {
                kernel_id: kernel.kernel_id,
                agent_id: agents[agent_idx].agent_id,
                allocated_slots: kernel.requested_slots.clone(),
            })
            .collect())
    }

    fn validate(
        &self,
        workload: &SessionWorkload,
        agents: &[AgentInfo],
    ) -> Result<(), AllocationFailure> {
        if workload.kernels.is_empty() {
            return Err(AllocationFailure::PolicyViolation {
                reason: "session has no kernels".to_string(),
            });
        }
        if !workload.slots_consistent() {
            return Err(AllocationFailure::PolicyViolation {
                reason: "session slot total does not match kernel sum".to_string(),
            });
        }
        if workload.requested_slots.has_negative() {
            return Err(AllocationFailure::PolicyViolation {
                reason: "negative slot quantity requested".to_string(),
            });
        }

        // A slot type no agent in the scaling group advertises can never be
        // satisfied here, regardless of load.
        let advertised: BTreeSet<&SlotName> = agents
            .iter()
            .flat_map(|a| a.available_slots.names())
            .collect();
        for (name, quantity) in &workload.requested_slots {
            if !quantity.is_zero() && !advertised.contains(name) {
                return Err(AllocationFailure::PolicyViolation {
                    reason: format!("unsupported resource type '{name}'"),
                });
            }
        }
        Ok(())
    }

    fn place_single_node<'w>(
        &self,
        workload: &'w SessionWorkload,
        agents: &[AgentInfo],
    ) -> Result<Vec<(usize, &'w KernelWorkload)>, AllocationFailure> {
        let demand = &workload.requested_slots;
        let pin = workload
            .designated_agent
            .or_else(|| workload.kernels.iter().find_map(|k| k.designated_agent));

        let candidates: Vec<usize> = agents
            .iter()
            .enumerate()
            .filter(|(_, a)| {
                a.schedulable
                    && pin.is_none_or(|p| p == a.agent_id)
                    && workload
                        .kernels
                        .iter()
                        .all(|k| k.image.architecture == a.architecture)
                    && a.can_fit(demand)
            })
            .map(|(i, _)| i)
            .collect();

        let chosen = self
            .rank(&candidates, agents, demand)
            .ok_or_else(|| AllocationFailure::ResourceInsufficient {
                demand: demand.clone(),
            })?;

        trace!(agent_id = %agents[chosen].agent_id, "Selected single-node agent");
        Ok(workload.kernels.iter().map(|k| (chosen, k)).collect())
    }

    fn place_multi_node<'w>(
        &self,
        workload: &'w SessionWorkload,
        agents: &[AgentInfo],
    ) -> Result<Vec<(usize, &'w KernelWorkload)>, AllocationFailure> {
        // Scratch occupancy overlay: nothing is applied unless every
        // kernel places (all-or-nothing).
        let mut overlay: Vec<ResourceSlot> =
            agents.iter().map(|a| a.occupied_slots.clone()).collect();
        let mut placements: Vec<(usize, &KernelWorkload)> = Vec::with_capacity(workload.kernels.len());
        let mut session_zone: Option<String> = None;

        for kernel in &workload.kernels {
            let demand = &kernel.requested_slots;
            let pin = kernel.designated_agent.or(workload.designated_agent);

            let mut candidates: Vec<usize> = agents
                .iter()
                .enumerate()
                .filter(|(i, a)| {
                    a.schedulable
                        && pin.is_none_or(|p| p == a.agent_id)
                        && kernel.image.architecture == a.architecture
                        && demand.fits_in(&a.available_slots.saturating_sub(&overlay[*i]))
                })
                .map(|(i, _)| i)
                .collect();

            // Co-locate with the zone of the first placed kernel; with
            // fragmentation allowed the zone is only a preference.
            if let Some(zone) = &session_zone {
                let same_zone: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|i| agents[*i].affinity_zone.as_deref() == Some(zone))
                    .collect();
                if !same_zone.is_empty() {
                    candidates = same_zone;
                } else if !self.allow_fragmentation {
                    return Err(AllocationFailure::ResourceInsufficient {
                        demand: demand.clone(),
                    });
                }
            }

            let chosen = self.rank_overlay(&candidates, agents, &overlay, demand).ok_or_else(
                || AllocationFailure::ResourceInsufficient {
                    demand: demand.clone(),
                },
            )?;

            if session_zone.is_none() {
                session_zone = agents[chosen].affinity_zone.clone();
            }
            overlay[chosen] += demand;
            placements.push((chosen, kernel));
        }

        Ok(placements)
    }

    /// Picks the best candidate by remaining capacity after allocation.
    ///
    /// Remaining capacity is compared component-wise over the demanded slot
    /// names in name order; ties break by agent id for determinism.
    fn rank(&self, candidates: &[usize], agents: &[AgentInfo], demand: &ResourceSlot) -> Option<usize> {
        let occupied: Vec<ResourceSlot> = agents.iter().map(|a| a.occupied_slots.clone()).collect();
        self.rank_with(candidates, agents, &occupied, demand)
    }

    fn rank_overlay(
        &self,
        candidates: &[usize],
        agents: &[AgentInfo],
        overlay: &[ResourceSlot],
        demand: &ResourceSlot,
    ) -> Option<usize> {
        self.rank_with(candidates, agents, overlay, demand)
    }

    fn rank_with(
        &self,
        candidates: &[usize],
        agents: &[AgentInfo],
        occupied: &[ResourceSlot],
        demand: &ResourceSlot,
    ) -> Option<usize> {
        candidates
            .iter()
            .copied()
            .min_by(|&a, &b| {
                let ka = remaining_key(&agents[a], &occupied[a], demand);
                let kb = remaining_key(&agents[b], &occupied[b], demand);
                let ord = match self.strategy {
                    SelectionStrategy::Concentrated => ka.cmp(&kb),
                    SelectionStrategy::Dispersed => kb.cmp(&ka),
                };
                ord.then_with(|| agents[a].agent_id.cmp(&agents[b].agent_id))
            })
    }
}

// Remaining quantities after allocation, projected onto the demanded slot
// names in name order.
fn remaining_key(agent: &AgentInfo, occupied: &ResourceSlot, demand: &ResourceSlot) -> Vec<Decimal> {
    let remaining = agent.available_slots.saturating_sub(occupied).saturating_sub(demand);
    demand.names().map(|n| remaining.get(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageRef, SessionStatus, SessionType};
    use chrono::Utc;
    use sokovan_id::{
        AccessKey, AgentId, DomainName, KernelId, ProjectId, ScalingGroup, SessionId, UserId,
    };

    fn slots(pairs: &[(&str, u64)]) -> ResourceSlot {
        pairs
            .iter()
            .map(|(k, v)| (SlotName::parse(k).unwrap(), Decimal::from(*v)))
            .collect()
    }

    fn agent(available: ResourceSlot, occupied: ResourceSlot) -> AgentInfo {
        AgentInfo {
            agent_id: AgentId::new(),
            scaling_group: ScalingGroup::parse("default").unwrap(),
            architecture: "x86_64".to_string(),
            available_slots: available,
            occupied_slots: occupied,
            schedulable: true,
            affinity_zone: None,
        }
    }

    fn workload(mode: ClusterMode, kernel_slots: Vec<ResourceSlot>) -> SessionWorkload {
        let total: ResourceSlot = kernel_slots.iter().sum();
        SessionWorkload {
            session_id: SessionId::new(),
            access_key: AccessKey::parse("AKTEST").unwrap(),
            user: UserId::new(),
            project: ProjectId::new(),
            domain: DomainName::parse("default").unwrap(),
            scaling_group: ScalingGroup::parse("default").unwrap(),
            status: SessionStatus::Pending,
            session_type: SessionType::Interactive,
            cluster_mode: mode,
            priority: 10,
            requested_slots: total,
            created_at: Utc::now(),
            starts_at: None,
            designated_agent: None,
            kernels: kernel_slots
                .into_iter()
                .map(|s| KernelWorkload {
                    kernel_id: KernelId::new(),
                    image: ImageRef {
                        canonical: "python:3.13".to_string(),
                        architecture: "x86_64".to_string(),
                    },
                    requested_slots: s,
                    designated_agent: None,
                })
                .collect(),
            retries: 0,
            deprioritized_count: 0,
        }
    }

    #[test]
    fn single_node_success_bumps_occupancy() {
        let selector = AgentSelector::new(SelectionStrategy::Dispersed, false);
        let mut agents = vec![agent(slots(&[("cpu", 4), ("mem", 8192)]), ResourceSlot::new())];
        let w = workload(ClusterMode::SingleNode, vec![slots(&[("cpu", 2), ("mem", 4096)])]);

        let allocs = selector.select(&w, &mut agents).unwrap();
        assert_eq!(allocs.len(), 1);
        assert_eq!(allocs[0].agent_id, agents[0].agent_id);
        assert_eq!(agents[0].occupied_slots, slots(&[("cpu", 2), ("mem", 4096)]));
    }

    #[test]
    fn insufficient_capacity_is_transient() {
        let selector = AgentSelector::new(SelectionStrategy::Dispersed, false);
        let mut agents = vec![agent(slots(&[("cpu", 4)]), slots(&[("cpu", 2)]))];
        let w = workload(ClusterMode::SingleNode, vec![slots(&[("cpu", 3)])]);

        let err = selector.select(&w, &mut agents).unwrap_err();
        assert!(matches!(err, AllocationFailure::ResourceInsufficient { .. }));
        // Failure leaves occupancy untouched.
        assert_eq!(agents[0].occupied_slots, slots(&[("cpu", 2)]));
    }

    #[test]
    fn unadvertised_slot_is_policy_violation() {
        let selector = AgentSelector::new(SelectionStrategy::Dispersed, false);
        let mut agents = vec![agent(slots(&[("cpu", 4)]), ResourceSlot::new())];
        let w = workload(
            ClusterMode::SingleNode,
            vec![slots(&[("cpu", 1), ("cuda.device", 1)])],
        );

        let err = selector.select(&w, &mut agents).unwrap_err();
        assert!(matches!(err, AllocationFailure::PolicyViolation { .. }));
    }

    #[test]
    fn inconsistent_slot_total_is_policy_violation() {
        let selector = AgentSelector::new(SelectionStrategy::Dispersed, false);
        let mut agents = vec![agent(slots(&[("cpu", 8)]), ResourceSlot::new())];
        let mut w = workload(ClusterMode::SingleNode, vec![slots(&[("cpu", 2)])]);
        w.requested_slots = slots(&[("cpu", 3)]);

        let err = selector.select(&w, &mut agents).unwrap_err();
        assert!(matches!(err, AllocationFailure::PolicyViolation { .. }));
    }

    #[test]
    fn concentrated_packs_dispersed_spreads() {
        let roomy = agent(slots(&[("cpu", 16)]), ResourceSlot::new());
        let tight = agent(slots(&[("cpu", 4)]), ResourceSlot::new());
        let w = workload(ClusterMode::SingleNode, vec![slots(&[("cpu", 2)])]);

        let mut agents = vec![roomy.clone(), tight.clone()];
        let allocs = AgentSelector::new(SelectionStrategy::Concentrated, false)
            .select(&w, &mut agents)
            .unwrap();
        assert_eq!(allocs[0].agent_id, tight.agent_id);

        let mut agents = vec![roomy.clone(), tight.clone()];
        let allocs = AgentSelector::new(SelectionStrategy::Dispersed, false)
            .select(&w, &mut agents)
            .unwrap();
        assert_eq!(allocs[0].agent_id, roomy.agent_id);
    }

    #[test]
    fn equal_capacity_ties_break_by_agent_id() {
        let a = agent(slots(&[("cpu", 8)]), ResourceSlot::new());
        let b = agent(slots(&[("cpu", 8)]), ResourceSlot::new());
        let lowest = a.agent_id.min(b.agent_id);
        let w = workload(ClusterMode::SingleNode, vec![slots(&[("cpu", 1)])]);

        for strategy in [SelectionStrategy::Concentrated, SelectionStrategy::Dispersed] {
            let mut agents = vec![a.clone(), b.clone()];
            let allocs = AgentSelector::new(strategy, false)
                .select(&w, &mut agents)
                .unwrap();
            assert_eq!(allocs[0].agent_id, lowest);
        }
    }

    #[test]
    fn designated_agent_is_honored() {
        let other = agent(slots(&[("cpu", 32)]), ResourceSlot::new());
        let pinned = agent(slots(&[("cpu", 4)]), ResourceSlot::new());
        let mut w = workload(ClusterMode::SingleNode, vec![slots(&[("cpu", 1)])]);
        w.designated_agent = Some(pinned.agent_id);

        let mut agents = vec![other, pinned.clone()];
        let allocs = AgentSelector::new(SelectionStrategy::Dispersed, false)
            .select(&w, &mut agents)
            .unwrap();
        assert_eq!(allocs[0].agent_id, pinned.agent_id);
    }

    #[test]
    fn architecture_mismatch_filters_agent() {
        let mut arm = agent(slots(&[("cpu", 32)]), ResourceSlot::new());
        arm.architecture = "aarch64".to_string();
        let w = workload(ClusterMode::SingleNode, vec![slots(&[("cpu", 1)])]);

        let mut agents = vec![arm];
        let err = AgentSelector::new(SelectionStrategy::Dispersed, false)
            .select(&w, &mut agents)
            .unwrap_err();
        assert!(matches!(err, AllocationFailure::ResourceInsufficient { .. }));
    }

    #[test]
    fn multi_node_is_all_or_nothing() {
        let selector = AgentSelector::new(SelectionStrategy::Dispersed, true);
        // Two kernels of 3 cpu each; only one fits anywhere.
        let mut agents = vec![agent(slots(&[("cpu", 4)]), ResourceSlot::new())];
        let w = workload(
            ClusterMode::MultiNode,
            vec![slots(&[("cpu", 3)]), slots(&[("cpu", 3)])],
        );

        let err = selector.select(&w, &mut agents).unwrap_err();
        assert!(matches!(err, AllocationFailure::ResourceInsufficient { .. }));
        assert!(agents[0].occupied_slots.is_zero());
    }

    #[test]
    fn multi_node_spreads_across_agents() {
        let selector = AgentSelector::new(SelectionStrategy::Dispersed, true);
        let mut agents = vec![
            agent(slots(&[("cpu", 4)]), ResourceSlot::new()),
            agent(slots(&[("cpu", 4)]), ResourceSlot::new()),
        ];
        let w = workload(
            ClusterMode::MultiNode,
            vec![slots(&[("cpu", 3)]), slots(&[("cpu", 3)])],
        );

        let allocs = selector.select(&w, &mut agents).unwrap();
        assert_eq!(allocs.len(), 2);
        assert_ne!(allocs[0].agent_id, allocs[1].agent_id);
    }

    #[test]
    fn multi_node_affinity_restricts_without_fragmentation() {
        let mut zone_a1 = agent(slots(&[("cpu", 4)]), ResourceSlot::new());
        zone_a1.affinity_zone = Some("rack-a".to_string());
        let mut zone_a2 = agent(slots(&[("cpu", 4)]), ResourceSlot::new());
        zone_a2.affinity_zone = Some("rack-a".to_string());
        let mut zone_b = agent(slots(&[("cpu", 64)]), ResourceSlot::new());
        zone_b.affinity_zone = Some("rack-b".to_string());

        let w = workload(
            ClusterMode::MultiNode,
            vec![slots(&[("cpu", 3)]), slots(&[("cpu", 3)])],
        );

        // Dispersed would pick rack-b for the second kernel if it could;
        // co-location forces both into rack-a. First kernel goes to the
        // most spacious agent (rack-b), so pin the first via zone choice:
        // the roomiest agent is in rack-b, and the second kernel then only
        // fits rack-b too.
        let mut agents = vec![zone_a1.clone(), zone_a2.clone(), zone_b.clone()];
        let allocs = AgentSelector::new(SelectionStrategy::Concentrated, false)
            .select(&w, &mut agents)
            .unwrap();
        // Concentrated picks a rack-a agent first (tightest), then must
        // stay in rack-a.
        let zones: Vec<_> = allocs
            .iter()
            .map(|al| {
                agents
                    .iter()
                    .find(|a| a.agent_id == al.agent_id)
                    .unwrap()
                    .affinity_zone
                    .clone()
            })
            .collect();
        assert!(zones.iter().all(|z| z.as_deref() == Some("rack-a")));
    }
}
