//! In-memory [`SchedulerRepository`] for tests.
//!
//! Models enough of a transactional store to exercise the scheduler:
//! capacity-checked allocation commits, batched status transitions, and
//! fair-share inputs. Failure injection covers the conflict and dispatch
//! paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sokovan_id::{AgentId, ScalingGroup, SessionId};
use sokovan_resources::ResourceSlot;
use sokovan_scheduler::config::SchedulerParams;
use sokovan_scheduler::errors::RepositoryError;
use sokovan_scheduler::fairshare::{FairShareSpec, UsageBucket};
use sokovan_scheduler::model::{
    AgentInfo, FairShareCalculationSnapshot, FairShareEntity, KernelAllocation, KernelStatus,
    SessionStatus, SessionWorkload, SystemSnapshot,
};
use sokovan_scheduler::repository::{SchedulerRepository, StatusTransitionOp};

#[derive(Default)]
struct State {
    sessions: BTreeMap<SessionId, SessionWorkload>,
    // Kernel rows share one status per session here; per-kernel divergence
    // is a host concern the scheduler never observes directly.
    kernel_statuses: HashMap<SessionId, KernelStatus>,
    agents: BTreeMap<AgentId, AgentInfo>,
    params: HashMap<ScalingGroup, SchedulerParams>,
    allocations: HashMap<SessionId, Vec<KernelAllocation>>,
    preconditions_not_ready: HashSet<SessionId>,
    dispatch_failures: HashSet<SessionId>,
    injected_conflicts: u32,
    fair_share_specs: Vec<(FairShareEntity, FairShareSpec)>,
    usage: HashMap<FairShareEntity, Vec<UsageBucket>>,
    cluster_capacity: ResourceSlot,
    fair_share_snapshots: BTreeMap<FairShareEntity, FairShareCalculationSnapshot>,
    transition_log: Vec<StatusTransitionOp>,
    dispatched_starts: Vec<SessionId>,
    dispatched_terminations: Vec<SessionId>,
}

/// In-memory store seeded through `add_*`/`set_*` and inspected through
/// the snapshot accessors at the bottom.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // -- seeding ------------------------------------------------------------

    pub fn add_session(&self, workload: SessionWorkload) {
        let mut state = self.lock();
        let kernel_status = match workload.status {
            SessionStatus::Pending | SessionStatus::Deprioritizing => KernelStatus::Pending,
            SessionStatus::Scheduled | SessionStatus::CheckingPrecondition => {
                KernelStatus::Scheduled
            }
            SessionStatus::Preparing => KernelStatus::Prepared,
            SessionStatus::Creating => KernelStatus::Creating,
            SessionStatus::Running => KernelStatus::Running,
            SessionStatus::Terminating => KernelStatus::Terminating,
            _ => KernelStatus::Pending,
        };
        state
            .kernel_statuses
            .insert(workload.session_id, kernel_status);
        state.sessions.insert(workload.session_id, workload);
    }

    pub fn add_agent(&self, agent: AgentInfo) {
        let mut state = self.lock();
        let group = agent.scaling_group.clone();
        state.params.entry(group).or_default();
        state.agents.insert(agent.agent_id, agent);
    }

    pub fn set_params(&self, scaling_group: &ScalingGroup, params: SchedulerParams) {
        self.lock().params.insert(scaling_group.clone(), params);
    }

    /// Next `count` allocation commits fail with a conflict.
    pub fn inject_commit_conflicts(&self, count: u32) {
        self.lock().injected_conflicts = count;
    }

    /// Marks a session's preconditions as not yet satisfied.
    pub fn set_preconditions_not_ready(&self, session_id: SessionId) {
        self.lock().preconditions_not_ready.insert(session_id);
    }

    pub fn clear_preconditions_not_ready(&self, session_id: SessionId) {
        self.lock().preconditions_not_ready.remove(&session_id);
    }

    /// Makes start/termination dispatch fail for a session.
    pub fn set_dispatch_failing(&self, session_id: SessionId) {
        self.lock().dispatch_failures.insert(session_id);
    }

    /// Simulates agent-side kernel progress (e.g. image pull finishing).
    pub fn set_kernel_status(&self, session_id: SessionId, status: KernelStatus) {
        self.lock().kernel_statuses.insert(session_id, status);
    }

    /// Forces a session's status directly, bypassing the coordinator.
    pub fn set_session_status(&self, session_id: SessionId, status: SessionStatus) {
        if let Some(session) = self.lock().sessions.get_mut(&session_id) {
            session.status = status;
        }
    }

    pub fn add_fair_share_spec(&self, entity: FairShareEntity, spec: FairShareSpec) {
        self.lock().fair_share_specs.push((entity, spec));
    }

    pub fn set_usage(&self, entity: FairShareEntity, buckets: Vec<UsageBucket>) {
        self.lock().usage.insert(entity, buckets);
    }

    pub fn set_cluster_capacity(&self, capacity: ResourceSlot) {
        self.lock().cluster_capacity = capacity;
    }

    /// Seeds a fair-share snapshot directly, bypassing recalculation.
    pub fn seed_fair_share_snapshot(
        &self,
        entity: FairShareEntity,
        snapshot: FairShareCalculationSnapshot,
    ) {
        self.lock().fair_share_snapshots.insert(entity, snapshot);
    }

    // -- inspection ---------------------------------------------------------

    pub fn session(&self, session_id: SessionId) -> Option<SessionWorkload> {
        self.lock().sessions.get(&session_id).cloned()
    }

    pub fn session_status(&self, session_id: SessionId) -> Option<SessionStatus> {
        self.lock().sessions.get(&session_id).map(|s| s.status)
    }

    pub fn kernel_status(&self, session_id: SessionId) -> Option<KernelStatus> {
        self.lock().kernel_statuses.get(&session_id).copied()
    }

    pub fn allocation(&self, session_id: SessionId) -> Option<Vec<KernelAllocation>> {
        self.lock().allocations.get(&session_id).cloned()
    }

    pub fn agent(&self, agent_id: AgentId) -> Option<AgentInfo> {
        self.lock().agents.get(&agent_id).cloned()
    }

    /// Every status transition applied so far, in application order.
    pub fn transition_log(&self) -> Vec<StatusTransitionOp> {
        self.lock().transition_log.clone()
    }

    pub fn dispatched_starts(&self) -> Vec<SessionId> {
        self.lock().dispatched_starts.clone()
    }

    pub fn dispatched_terminations(&self) -> Vec<SessionId> {
        self.lock().dispatched_terminations.clone()
    }

    pub fn fair_share_snapshots(
        &self,
    ) -> BTreeMap<FairShareEntity, FairShareCalculationSnapshot> {
        self.lock().fair_share_snapshots.clone()
    }
}

#[async_trait]
impl SchedulerRepository for InMemoryRepository {
    async fn schedulable_scaling_groups(&self) -> Result<Vec<ScalingGroup>, RepositoryError> {
        let state = self.lock();
        let mut groups: Vec<ScalingGroup> = state.params.keys().cloned().collect();
        groups.sort();
        Ok(groups)
    }

    async fn sessions_by_status(
        &self,
        scaling_group: &ScalingGroup,
        statuses: &[SessionStatus],
        kernel_statuses: Option<&[KernelStatus]>,
    ) -> Result<Vec<SessionWorkload>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .sessions
            .values()
            .filter(|s| s.scaling_group == *scaling_group && statuses.contains(&s.status))
            .filter(|s| match kernel_statuses {
                Some(wanted) => state
                    .kernel_statuses
                    .get(&s.session_id)
                    .is_some_and(|ks| wanted.contains(ks)),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn system_snapshot(
        &self,
        scaling_group: &ScalingGroup,
    ) -> Result<SystemSnapshot, RepositoryError> {
        let state = self.lock();
        let total_capacity: ResourceSlot = state
            .agents
            .values()
            .filter(|a| a.scaling_group == *scaling_group)
            .map(|a| &a.available_slots)
            .sum();

        let mut occupancy_by_user: BTreeMap<_, ResourceSlot> = BTreeMap::new();
        let mut occupancy_by_project: BTreeMap<_, ResourceSlot> = BTreeMap::new();
        for (session_id, allocations) in &state.allocations {
            let Some(session) = state.sessions.get(session_id) else {
                continue;
            };
            let total: ResourceSlot = allocations.iter().map(|a| &a.allocated_slots).sum();
            let user_slot = occupancy_by_user.entry(session.user).or_default();
            *user_slot += &total;
            let project_slot = occupancy_by_project.entry(session.project).or_default();
            *project_slot += &total;
        }

        Ok(SystemSnapshot {
            total_capacity,
            occupancy_by_user,
            occupancy_by_project,
            fair_share: state.fair_share_snapshots.clone(),
            taken_at: Utc::now(),
        })
    }

    async fn agents(
        &self,
        scaling_group: &ScalingGroup,
    ) -> Result<Vec<AgentInfo>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .agents
            .values()
            .filter(|a| a.scaling_group == *scaling_group)
            .cloned()
            .collect())
    }

    async fn scheduler_params(
        &self,
        scaling_group: &ScalingGroup,
    ) -> Result<SchedulerParams, RepositoryError> {
        self.lock()
            .params
            .get(scaling_group)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("scaling group {scaling_group}")))
    }

    async fn commit_allocation(
        &self,
        session_id: SessionId,
        allocations: &[KernelAllocation],
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.injected_conflicts > 0 {
            state.injected_conflicts -= 1;
            return Err(RepositoryError::Conflict("injected".to_string()));
        }

        // Capacity re-check inside the "transaction", mirroring a store
        // that verifies against current agent rows. Demand is summed per
        // agent first; two kernels of one batch may not jointly exceed an
        // agent that fits each of them alone.
        let mut demand: BTreeMap<AgentId, ResourceSlot> = BTreeMap::new();
        for alloc in allocations {
            *demand.entry(alloc.agent_id).or_default() += &alloc.allocated_slots;
        }
        for (agent_id, requested) in &demand {
            let agent = state
                .agents
                .get(agent_id)
                .ok_or_else(|| RepositoryError::NotFound(format!("agent {agent_id}")))?;
            if !agent.can_fit(requested) {
                return Err(RepositoryError::Conflict(format!(
                    "agent {agent_id} over capacity"
                )));
            }
        }
        for alloc in allocations {
            if let Some(agent) = state.agents.get_mut(&alloc.agent_id) {
                agent.occupied_slots += &alloc.allocated_slots;
            }
        }
        state.allocations.insert(session_id, allocations.to_vec());
        Ok(())
    }

    async fn release_allocation(&self, session_id: SessionId) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if let Some(allocations) = state.allocations.remove(&session_id) {
            for alloc in allocations {
                if let Some(agent) = state.agents.get_mut(&alloc.agent_id) {
                    agent.occupied_slots =
                        agent.occupied_slots.saturating_sub(&alloc.allocated_slots);
                }
            }
        }
        Ok(())
    }

    async fn increment_retries(&self, session_ids: &[SessionId]) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        for id in session_ids {
            if let Some(session) = state.sessions.get_mut(id) {
                session.retries += 1;
            }
        }
        Ok(())
    }

    async fn deprioritize(
        &self,
        session_ids: &[SessionId],
        amount: i32,
        floor: i32,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        for id in session_ids {
            if let Some(session) = state.sessions.get_mut(id) {
                session.priority = (session.priority - amount).max(floor);
                session.deprioritized_count += 1;
            }
        }
        Ok(())
    }

    async fn transition_statuses(
        &self,
        ops: &[StatusTransitionOp],
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        for op in ops {
            if let Some(new_status) = op.session_status {
                if let Some(session) = state.sessions.get_mut(&op.session_id) {
                    session.status = new_status;
                }
            }
            if let Some(new_kernel_status) = op.kernel_status {
                state.kernel_statuses.insert(op.session_id, new_kernel_status);
            }
            state.transition_log.push(op.clone());
        }
        Ok(())
    }

    async fn preconditions_satisfied(
        &self,
        session_id: SessionId,
    ) -> Result<bool, RepositoryError> {
        Ok(!self.lock().preconditions_not_ready.contains(&session_id))
    }

    async fn dispatch_start(&self, session_id: SessionId) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.dispatch_failures.contains(&session_id) {
            return Err(RepositoryError::Internal("dispatch refused".to_string()));
        }
        state.dispatched_starts.push(session_id);
        Ok(())
    }

    async fn dispatch_termination(&self, session_id: SessionId) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state.dispatch_failures.contains(&session_id) {
            return Err(RepositoryError::Internal("dispatch refused".to_string()));
        }
        state.dispatched_terminations.push(session_id);
        Ok(())
    }

    async fn fair_share_specs(
        &self,
    ) -> Result<Vec<(FairShareEntity, FairShareSpec)>, RepositoryError> {
        Ok(self.lock().fair_share_specs.clone())
    }

    async fn usage_buckets(
        &self,
        entity: &FairShareEntity,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageBucket>, RepositoryError> {
        let state = self.lock();
        Ok(state
            .usage
            .get(entity)
            .map(|buckets| {
                buckets
                    .iter()
                    .filter(|b| b.start >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn cluster_capacity(&self) -> Result<ResourceSlot, RepositoryError> {
        Ok(self.lock().cluster_capacity.clone())
    }

    async fn put_fair_share_snapshots(
        &self,
        snapshots: &[(FairShareEntity, FairShareCalculationSnapshot)],
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        for (entity, snapshot) in snapshots {
            state
                .fair_share_snapshots
                .insert(entity.clone(), snapshot.clone());
        }
        Ok(())
    }
}
