//! The pending→scheduled handler, wrapping the core scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use sokovan_events::LifecycleEventKind;
use sokovan_id::ScalingGroup;

use crate::errors::SchedulerResult;
use crate::lifecycle::{
    ExecutionResult, LifecycleHandler, SessionOutcome, Transition, TransitionTable,
};
use crate::lock::{LockId, LOCK_SCHEDULE};
use crate::model::{KernelStatus, SessionStatus, SessionWorkload};
use crate::scheduler::{Scheduler, SchedulingDecision};

/// Runs the scheduler over pending sessions and categorizes its decisions.
///
/// Declares a cluster-wide lock: the scheduling pass must not run
/// concurrently with itself across manager replicas.
pub struct ScheduleHandler {
    scheduler: Arc<Scheduler>,
}

impl ScheduleHandler {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl LifecycleHandler for ScheduleHandler {
    fn name(&self) -> &'static str {
        "schedule"
    }

    fn target_statuses(&self) -> &'static [SessionStatus] {
        &[SessionStatus::Pending]
    }

    fn target_kernel_statuses(&self) -> Option<&'static [KernelStatus]> {
        Some(&[KernelStatus::Pending])
    }

    fn transitions(&self) -> TransitionTable {
        TransitionTable {
            success: Transition {
                session: Some(SessionStatus::Scheduled),
                kernel: Some(KernelStatus::Scheduled),
                event: Some(LifecycleEventKind::Scheduled),
            },
            // Stays pending; the retry counter was already bumped.
            need_retry: Transition {
                session: None,
                kernel: None,
                event: Some(LifecycleEventKind::ScheduleRetried),
            },
            expired: Transition {
                session: Some(SessionStatus::Terminating),
                kernel: Some(KernelStatus::Terminating),
                event: Some(LifecycleEventKind::Terminating),
            },
            give_up: Transition {
                session: Some(SessionStatus::Deprioritizing),
                kernel: None,
                event: None,
            },
        }
    }

    fn lock_id(&self, scaling_group: &ScalingGroup) -> Option<LockId> {
        Some(LOCK_SCHEDULE.scoped(scaling_group.as_str()))
    }

    async fn execute(
        &self,
        scaling_group: &ScalingGroup,
        sessions: Vec<SessionWorkload>,
    ) -> SchedulerResult<ExecutionResult> {
        let decisions = self.scheduler.schedule(scaling_group, sessions).await?;

        let mut result = ExecutionResult::default();
        for decision in decisions {
            match decision {
                SchedulingDecision::Success { session_id, .. } => {
                    result.successes.push(SessionOutcome::new(session_id));
                }
                SchedulingDecision::NeedRetry { session_id, reason } => {
                    result
                        .need_retry
                        .push(SessionOutcome::with_reason(session_id, reason));
                }
                SchedulingDecision::GiveUp { session_id, reason } => {
                    result
                        .give_ups
                        .push(SessionOutcome::with_reason(session_id, reason));
                }
                SchedulingDecision::Expired { session_id, reason } => {
                    result
                        .expired
                        .push(SessionOutcome::with_reason(session_id, reason));
                }
            }
        }
        Ok(result)
    }
}
