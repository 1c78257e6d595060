//! The core scheduling loop, invoked per scaling group per tick.
//!
//! Workloads are attempted strictly in prioritizer order; a later workload
//! must never consume capacity an earlier one in the same tick still needs,
//! so allocation commits are applied sequentially within one scaling
//! group's tick. Ticks for different scaling groups may run concurrently.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sokovan_id::{ScalingGroup, SessionId};
use tracing::{debug, info, instrument, warn};

use crate::allocator::{AgentSelector, AllocationFailure};
use crate::config::SchedulerParams;
use crate::errors::{RepositoryError, SchedulerError, SchedulerResult};
use crate::lock::ResourceLocks;
use crate::lock::LOCK_SCHEDULE;
use crate::model::{AgentInfo, KernelAllocation, SessionWorkload};
use crate::repository::SchedulerRepository;
use crate::retry::RetryPolicy;

/// Reason strings recorded in status history.
pub mod reasons {
    pub const NO_AVAILABLE_INSTANCES: &str = "no-available-instances";
    pub const PENDING_TIMEOUT: &str = "pending-timeout";
    pub const RETRY_BUDGET_EXHAUSTED: &str = "scheduling-retries-exhausted";
    pub const ALLOCATION_CONFLICT: &str = "allocation-conflict";
}

/// Outcome of one workload's scheduling attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulingDecision {
    /// All kernels placed and committed.
    Success {
        session_id: SessionId,
        allocations: Vec<KernelAllocation>,
    },
    /// Transient failure; stays pending with its retry counter bumped.
    NeedRetry {
        session_id: SessionId,
        reason: String,
    },
    /// Retry budget exhausted or the request is permanently unsatisfiable;
    /// routed to deprioritization, not terminated.
    GiveUp {
        session_id: SessionId,
        reason: String,
    },
    /// `starts_at` deadline passed without ever succeeding.
    Expired {
        session_id: SessionId,
        reason: String,
    },
}

impl SchedulingDecision {
    /// The session the decision concerns.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        match self {
            SchedulingDecision::Success { session_id, .. }
            | SchedulingDecision::NeedRetry { session_id, .. }
            | SchedulingDecision::GiveUp { session_id, .. }
            | SchedulingDecision::Expired { session_id, .. } => *session_id,
        }
    }
}

/// The allocation engine: prioritizes pending workloads and commits
/// placements for one scaling group.
pub struct Scheduler {
    repository: Arc<dyn SchedulerRepository>,
    resource_locks: Arc<ResourceLocks>,
    retry: RetryPolicy,
    resource_lock_timeout: Duration,
}

impl Scheduler {
    /// Creates a scheduler over the given repository.
    pub fn new(
        repository: Arc<dyn SchedulerRepository>,
        resource_locks: Arc<ResourceLocks>,
        retry: RetryPolicy,
        resource_lock_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            resource_locks,
            retry,
            resource_lock_timeout,
        }
    }

    /// Schedules the given pending workloads for one scaling group.
    ///
    /// The capacity read, the placement decisions, and the allocation
    /// commits all happen under the scaling group's resource lock, so
    /// concurrent attempts in the same group are serialized.
    #[instrument(skip(self, workloads), fields(scaling_group = %scaling_group, pending = workloads.len()))]
    pub async fn schedule(
        &self,
        scaling_group: &ScalingGroup,
        workloads: Vec<SessionWorkload>,
    ) -> SchedulerResult<Vec<SchedulingDecision>> {
        if workloads.is_empty() {
            return Ok(Vec::new());
        }

        let params = self
            .retry
            .run("scheduler_params", || {
                self.repository.scheduler_params(scaling_group)
            })
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound(_) => {
                    SchedulerError::UnknownScalingGroup(scaling_group.as_str().to_string())
                }
                other => other.into(),
            })?;

        let _guard = self
            .resource_locks
            .acquire(scaling_group, self.resource_lock_timeout)
            .await
            .map_err(|_| SchedulerError::LockTimeout {
                lock_id: LOCK_SCHEDULE.scoped(scaling_group.as_str()),
            })?;

        // Snapshot reads happen inside the lock scope so decide+commit is
        // atomic with respect to other attempts in this group. The two
        // fetches themselves run concurrently.
        let (snapshot, agents) = tokio::join!(
            self.retry
                .run("system_snapshot", || self
                    .repository
                    .system_snapshot(scaling_group)),
            self.retry
                .run("agents", || self.repository.agents(scaling_group)),
        );
        let snapshot = snapshot?;
        let mut agents = agents?;

        let ordered = params.prioritizer.prioritize(&snapshot, workloads);
        let selector = AgentSelector::new(
            params.selection_strategy,
            params.allow_fractional_resource_fragmentation,
        );

        let now = Utc::now();
        let mut decisions = Vec::with_capacity(ordered.len());
        for workload in &ordered {
            if workload.is_expired(now) {
                decisions.push(SchedulingDecision::Expired {
                    session_id: workload.session_id,
                    reason: reasons::PENDING_TIMEOUT.to_string(),
                });
                continue;
            }
            let decision = self
                .attempt(&selector, &params, workload, scaling_group, &mut agents)
                .await?;
            decisions.push(decision);
        }

        let retry_ids: Vec<SessionId> = decisions
            .iter()
            .filter_map(|d| match d {
                SchedulingDecision::NeedRetry { session_id, .. } => Some(*session_id),
                _ => None,
            })
            .collect();
        if !retry_ids.is_empty() {
            self.retry
                .run("increment_retries", || {
                    self.repository.increment_retries(&retry_ids)
                })
                .await?;
        }

        info!(
            scheduled = decisions
                .iter()
                .filter(|d| matches!(d, SchedulingDecision::Success { .. }))
                .count(),
            retried = retry_ids.len(),
            "Scheduling pass complete"
        );
        Ok(decisions)
    }

    /// One workload's attempt: select, commit, and classify.
    async fn attempt(
        &self,
        selector: &AgentSelector,
        params: &SchedulerParams,
        workload: &SessionWorkload,
        scaling_group: &ScalingGroup,
        agents: &mut Vec<AgentInfo>,
    ) -> SchedulerResult<SchedulingDecision> {
        let session_id = workload.session_id;
        match selector.select(workload, agents) {
            Ok(allocations) => {
                match self
                    .repository
                    .commit_allocation(session_id, &allocations)
                    .await
                {
                    Ok(()) => {
                        debug!(session_id = %session_id, kernels = allocations.len(), "Allocation committed");
                        Ok(SchedulingDecision::Success {
                            session_id,
                            allocations,
                        })
                    }
                    Err(err) if err.is_conflict() => {
                        // Lost the race (e.g. an agent heartbeat shrank
                        // capacity): refresh and retry once in-tick.
                        warn!(session_id = %session_id, error = %err, "Allocation conflict, retrying once");
                        *agents = self
                            .retry
                            .run("agents", || self.repository.agents(scaling_group))
                            .await?;
                        self.attempt_after_conflict(selector, workload, agents).await
                    }
                    Err(err) => Err(err.into()),
                }
            }
            Err(failure) => Ok(self.classify_failure(params, workload, failure)),
        }
    }

    async fn attempt_after_conflict(
        &self,
        selector: &AgentSelector,
        workload: &SessionWorkload,
        agents: &mut [AgentInfo],
    ) -> SchedulerResult<SchedulingDecision> {
        let session_id = workload.session_id;
        match selector.select(workload, agents) {
            Ok(allocations) => match self
                .repository
                .commit_allocation(session_id, &allocations)
                .await
            {
                Ok(()) => Ok(SchedulingDecision::Success {
                    session_id,
                    allocations,
                }),
                Err(err) if err.is_conflict() => {
                    // Nothing was committed: the tentative occupancy the
                    // selector applied must not linger for later workloads
                    // in this tick.
                    Self::release_tentative(agents, &allocations);
                    Ok(SchedulingDecision::NeedRetry {
                        session_id,
                        reason: reasons::ALLOCATION_CONFLICT.to_string(),
                    })
                }
                Err(err) => Err(err.into()),
            },
            Err(_) => Ok(SchedulingDecision::NeedRetry {
                session_id,
                reason: reasons::ALLOCATION_CONFLICT.to_string(),
            }),
        }
    }

    /// Undoes the tentative occupancy a selection applied to the in-memory
    /// agent view when its commit did not go through.
    fn release_tentative(agents: &mut [AgentInfo], allocations: &[KernelAllocation]) {
        for allocation in allocations {
            if let Some(agent) = agents.iter_mut().find(|a| a.agent_id == allocation.agent_id) {
                agent.occupied_slots = agent.occupied_slots.saturating_sub(&allocation.allocated_slots);
            }
        }
    }

    fn classify_failure(
        &self,
        params: &SchedulerParams,
        workload: &SessionWorkload,
        failure: AllocationFailure,
    ) -> SchedulingDecision {
        let session_id = workload.session_id;
        match failure {
            AllocationFailure::PolicyViolation { reason } => {
                // Permanent: no retry budget consumed.
                SchedulingDecision::GiveUp { session_id, reason }
            }
            AllocationFailure::ResourceInsufficient { .. } => {
                if workload.retries >= params.max_scheduling_retries {
                    SchedulingDecision::GiveUp {
                        session_id,
                        reason: reasons::RETRY_BUDGET_EXHAUSTED.to_string(),
                    }
                } else {
                    SchedulingDecision::NeedRetry {
                        session_id,
                        reason: reasons::NO_AVAILABLE_INSTANCES.to_string(),
                    }
                }
            }
        }
    }
}
