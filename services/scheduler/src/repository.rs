//! The repository seam.
//!
//! The scheduler core assumes a transactional store that returns domain
//! objects; schema, row mapping, and migrations belong to the host. Every
//! method is a suspension point. Agent capacity rows are mutated only
//! through [`SchedulerRepository::commit_allocation`], never
//! read-modify-written elsewhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sokovan_id::{ScalingGroup, SessionId};
use sokovan_resources::ResourceSlot;

use crate::errors::RepositoryError;
use crate::fairshare::{FairShareSpec, UsageBucket};
use crate::config::SchedulerParams;
use crate::model::{
    AgentInfo, FairShareCalculationSnapshot, FairShareEntity, KernelAllocation, KernelStatus,
    SessionStatus, SessionWorkload, SystemSnapshot,
};

/// One session's status change, applied in a batch per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransitionOp {
    pub session_id: SessionId,
    /// New session status; `None` leaves the session status unchanged.
    pub session_status: Option<SessionStatus>,
    /// New status for all of the session's kernels; `None` leaves them.
    pub kernel_status: Option<KernelStatus>,
    /// Operator-visible reason recorded in status history.
    pub reason: Option<String>,
}

/// Transactional store backing the scheduler core.
#[async_trait]
pub trait SchedulerRepository: Send + Sync {
    /// Scaling groups currently marked schedulable.
    async fn schedulable_scaling_groups(&self) -> Result<Vec<ScalingGroup>, RepositoryError>;

    /// Sessions in any of `statuses` within a scaling group, optionally
    /// restricted to sessions whose kernels are all in `kernel_statuses`.
    async fn sessions_by_status(
        &self,
        scaling_group: &ScalingGroup,
        statuses: &[SessionStatus],
        kernel_statuses: Option<&[KernelStatus]>,
    ) -> Result<Vec<SessionWorkload>, RepositoryError>;

    /// Point-in-time allocation and fair-share view for one scaling group.
    async fn system_snapshot(
        &self,
        scaling_group: &ScalingGroup,
    ) -> Result<SystemSnapshot, RepositoryError>;

    /// Capacity snapshots for a scaling group's agents.
    async fn agents(&self, scaling_group: &ScalingGroup)
        -> Result<Vec<AgentInfo>, RepositoryError>;

    /// Scheduling policy for a scaling group.
    async fn scheduler_params(
        &self,
        scaling_group: &ScalingGroup,
    ) -> Result<SchedulerParams, RepositoryError>;

    /// Atomically records a session's kernel placements and bumps the
    /// agents' occupied slots, verifying capacity inside the same
    /// transaction. Returns [`RepositoryError::Conflict`] when another
    /// actor won the race (e.g. an agent heartbeat shrank capacity).
    async fn commit_allocation(
        &self,
        session_id: SessionId,
        allocations: &[KernelAllocation],
    ) -> Result<(), RepositoryError>;

    /// Releases a session's committed allocation (rollback path).
    async fn release_allocation(&self, session_id: SessionId) -> Result<(), RepositoryError>;

    /// Increments the scheduling retry counter for the given sessions.
    async fn increment_retries(&self, session_ids: &[SessionId]) -> Result<(), RepositoryError>;

    /// Lowers priority by `amount`, flooring at `floor`, and increments
    /// each session's deprioritized count.
    async fn deprioritize(
        &self,
        session_ids: &[SessionId],
        amount: i32,
        floor: i32,
    ) -> Result<(), RepositoryError>;

    /// Applies a batch of status transitions in one transaction.
    async fn transition_statuses(
        &self,
        ops: &[StatusTransitionOp],
    ) -> Result<(), RepositoryError>;

    /// Checks that a scheduled session's committed allocation is still
    /// actionable (agents alive, images resolvable). `Ok(false)` means
    /// "not yet", to be re-checked next tick.
    async fn preconditions_satisfied(
        &self,
        session_id: SessionId,
    ) -> Result<bool, RepositoryError>;

    /// Asks the agents owning a session's kernels to start them. The
    /// container mechanics are downstream; only the dispatch outcome is
    /// observed here.
    async fn dispatch_start(&self, session_id: SessionId) -> Result<(), RepositoryError>;

    /// Asks the agents owning a session's kernels to terminate them.
    async fn dispatch_termination(&self, session_id: SessionId) -> Result<(), RepositoryError>;

    // -- fair-share recalculation inputs/outputs ----------------------------

    /// Entities with fair-share configuration.
    async fn fair_share_specs(
        &self,
    ) -> Result<Vec<(FairShareEntity, FairShareSpec)>, RepositoryError>;

    /// Historical usage buckets for one entity, newest first, covering the
    /// given window.
    async fn usage_buckets(
        &self,
        entity: &FairShareEntity,
        since: DateTime<Utc>,
    ) -> Result<Vec<UsageBucket>, RepositoryError>;

    /// Total capacity across the cluster, used to weight usage against
    /// what can actually be allocated today.
    async fn cluster_capacity(&self) -> Result<ResourceSlot, RepositoryError>;

    /// Persists recalculated fair-share snapshots.
    async fn put_fair_share_snapshots(
        &self,
        snapshots: &[(FairShareEntity, FairShareCalculationSnapshot)],
    ) -> Result<(), RepositoryError>;
}
