//! Lifecycle handlers and their coordinator.
//!
//! Each handler declares, as pure metadata, which sessions it operates on
//! and which status transition each outcome category maps to. Handlers run
//! business logic only; status columns are written exclusively by the
//! [`coordinator::LifecycleCoordinator`] applying the declared table.

pub mod coordinator;
pub mod handlers;

pub use coordinator::LifecycleCoordinator;

use async_trait::async_trait;
use sokovan_events::LifecycleEventKind;
use sokovan_id::{ScalingGroup, SessionId};

use crate::errors::SchedulerResult;
use crate::lock::LockId;
use crate::model::{KernelStatus, SessionStatus, SessionWorkload};

/// The status change (and event) declared for one outcome category.
///
/// `None` means "leave unchanged".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    pub session: Option<SessionStatus>,
    pub kernel: Option<KernelStatus>,
    /// Lifecycle event emitted after the transition batch is persisted.
    pub event: Option<LifecycleEventKind>,
}

impl Transition {
    /// A transition that changes nothing and emits nothing.
    pub const NONE: Transition = Transition {
        session: None,
        kernel: None,
        event: None,
    };
}

/// Per-category transitions for one handler.
///
/// Every category is present by construction, so a "missing category"
/// handler bug cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTable {
    pub success: Transition,
    pub need_retry: Transition,
    pub expired: Transition,
    pub give_up: Transition,
}

/// One session's outcome as reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub session_id: SessionId,
    /// Operator-visible reason recorded in status history.
    pub reason: Option<String>,
    pub exit_code: Option<i32>,
}

impl SessionOutcome {
    /// Outcome with no reason or exit code.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            reason: None,
            exit_code: None,
        }
    }

    /// Outcome with a reason string.
    #[must_use]
    pub fn with_reason(session_id: SessionId, reason: impl Into<String>) -> Self {
        Self {
            session_id,
            reason: Some(reason.into()),
            exit_code: None,
        }
    }
}

/// Categorized results of one handler execution.
///
/// A session must appear in at most one category; the coordinator fails
/// that session's transition otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub successes: Vec<SessionOutcome>,
    pub need_retry: Vec<SessionOutcome>,
    pub expired: Vec<SessionOutcome>,
    pub give_ups: Vec<SessionOutcome>,
}

impl ExecutionResult {
    /// Total sessions reported across all categories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.successes.len() + self.need_retry.len() + self.expired.len() + self.give_ups.len()
    }

    /// True if no sessions were reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counters for one tick of a handler (or of the scheduler).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sessions whose success transition was applied.
    pub scheduled: usize,
    /// Sessions left for a later tick.
    pub retried: usize,
    /// Sessions that exhausted their budget.
    pub given_up: usize,
    /// Sessions whose deadline passed.
    pub expired: usize,
    /// Sessions skipped because the handler broke its contract for them.
    pub invariant_errors: usize,
}

impl TickReport {
    /// Merges another report's counters into this one.
    pub fn merge(&mut self, other: &TickReport) {
        self.scheduled += other.scheduled;
        self.retried += other.retried;
        self.given_up += other.given_up;
        self.expired += other.expired;
        self.invariant_errors += other.invariant_errors;
    }

    /// True if every counter is zero.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        *self == TickReport::default()
    }
}

/// A lifecycle transition handler.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    /// Stable handler name, used to address lifecycle ticks.
    fn name(&self) -> &'static str;

    /// Session statuses this handler picks up.
    fn target_statuses(&self) -> &'static [SessionStatus];

    /// Optional kernel-level filter: only sessions whose kernels are all
    /// in one of these statuses are selected.
    fn target_kernel_statuses(&self) -> Option<&'static [KernelStatus]> {
        None
    }

    /// The status-transition table applied per outcome category.
    fn transitions(&self) -> TransitionTable;

    /// Cluster-wide lock required during execution, if any, scoped to the
    /// scaling group being ticked. Handlers without one may run
    /// concurrently with themselves across manager replicas and must
    /// tolerate that.
    fn lock_id(&self, _scaling_group: &ScalingGroup) -> Option<LockId> {
        None
    }

    /// Business logic. Must not write status columns; business failures
    /// are categories in the result, never errors.
    async fn execute(
        &self,
        scaling_group: &ScalingGroup,
        sessions: Vec<SessionWorkload>,
    ) -> SchedulerResult<ExecutionResult>;
}
