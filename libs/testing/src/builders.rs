//! Fluent builders for scheduler domain objects.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sokovan_id::{
    AccessKey, AgentId, DomainName, KernelId, ProjectId, ScalingGroup, SessionId, UserId,
};
use sokovan_resources::{ResourceSlot, SlotName};
use sokovan_scheduler::model::{
    AgentInfo, ClusterMode, ImageRef, KernelWorkload, SessionStatus, SessionType, SessionWorkload,
};

/// Builds a [`ResourceSlot`] from name/quantity pairs.
///
/// Panics on an invalid slot name; fine for test input.
#[must_use]
pub fn slots(pairs: &[(&str, u64)]) -> ResourceSlot {
    pairs
        .iter()
        .map(|(name, qty)| (SlotName::parse(name).unwrap(), Decimal::from(*qty)))
        .collect()
}

/// Builder for [`SessionWorkload`] with sensible single-kernel defaults.
pub struct WorkloadBuilder {
    workload: SessionWorkload,
}

impl WorkloadBuilder {
    /// A single-kernel interactive session requesting `requested` slots.
    #[must_use]
    pub fn new(scaling_group: &ScalingGroup, requested: ResourceSlot) -> Self {
        let kernel = KernelWorkload {
            kernel_id: KernelId::new(),
            image: ImageRef {
                canonical: "python:3.13".to_string(),
                architecture: "x86_64".to_string(),
            },
            requested_slots: requested.clone(),
            designated_agent: None,
        };
        Self {
            workload: SessionWorkload {
                session_id: SessionId::new(),
                access_key: AccessKey::parse("AKTEST").unwrap(),
                user: UserId::new(),
                project: ProjectId::new(),
                domain: DomainName::parse("default").unwrap(),
                scaling_group: scaling_group.clone(),
                status: SessionStatus::Pending,
                session_type: SessionType::Interactive,
                cluster_mode: ClusterMode::SingleNode,
                priority: 10,
                requested_slots: requested,
                created_at: Utc::now(),
                starts_at: None,
                designated_agent: None,
                kernels: vec![kernel],
                retries: 0,
                deprioritized_count: 0,
            },
        }
    }

    #[must_use]
    pub fn user(mut self, user: UserId) -> Self {
        self.workload.user = user;
        self
    }

    #[must_use]
    pub fn project(mut self, project: ProjectId) -> Self {
        self.workload.project = project;
        self
    }

    #[must_use]
    pub fn domain(mut self, domain: DomainName) -> Self {
        self.workload.domain = domain;
        self
    }

    #[must_use]
    pub fn status(mut self, status: SessionStatus) -> Self {
        self.workload.status = status;
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.workload.priority = priority;
        self
    }

    #[must_use]
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.workload.created_at = at;
        self
    }

    #[must_use]
    pub fn starts_at(mut self, deadline: DateTime<Utc>) -> Self {
        self.workload.starts_at = Some(deadline);
        self
    }

    #[must_use]
    pub fn designated_agent(mut self, agent: AgentId) -> Self {
        self.workload.designated_agent = Some(agent);
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.workload.retries = retries;
        self
    }

    #[must_use]
    pub fn deprioritized_count(mut self, count: u32) -> Self {
        self.workload.deprioritized_count = count;
        self
    }

    /// Replaces the kernels with a multi-node set, one kernel per demand,
    /// and makes the session total their sum.
    #[must_use]
    pub fn multi_node(mut self, kernel_demands: &[ResourceSlot]) -> Self {
        self.workload.cluster_mode = ClusterMode::MultiNode;
        self.workload.kernels = kernel_demands
            .iter()
            .map(|demand| KernelWorkload {
                kernel_id: KernelId::new(),
                image: ImageRef {
                    canonical: "python:3.13".to_string(),
                    architecture: "x86_64".to_string(),
                },
                requested_slots: demand.clone(),
                designated_agent: None,
            })
            .collect();
        self.workload.requested_slots = kernel_demands.iter().sum();
        self
    }

    #[must_use]
    pub fn build(self) -> SessionWorkload {
        self.workload
    }
}

/// Builder for [`AgentInfo`] with an empty occupancy default.
pub struct AgentBuilder {
    agent: AgentInfo,
}

impl AgentBuilder {
    #[must_use]
    pub fn new(scaling_group: &ScalingGroup, available: ResourceSlot) -> Self {
        Self {
            agent: AgentInfo {
                agent_id: AgentId::new(),
                scaling_group: scaling_group.clone(),
                architecture: "x86_64".to_string(),
                available_slots: available,
                occupied_slots: ResourceSlot::default(),
                schedulable: true,
                affinity_zone: None,
            },
        }
    }

    #[must_use]
    pub fn id(mut self, agent_id: AgentId) -> Self {
        self.agent.agent_id = agent_id;
        self
    }

    #[must_use]
    pub fn architecture(mut self, arch: &str) -> Self {
        self.agent.architecture = arch.to_string();
        self
    }

    #[must_use]
    pub fn occupied(mut self, occupied: ResourceSlot) -> Self {
        self.agent.occupied_slots = occupied;
        self
    }

    #[must_use]
    pub fn schedulable(mut self, schedulable: bool) -> Self {
        self.agent.schedulable = schedulable;
        self
    }

    #[must_use]
    pub fn affinity_zone(mut self, zone: &str) -> Self {
        self.agent.affinity_zone = Some(zone.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> AgentInfo {
        self.agent
    }
}
