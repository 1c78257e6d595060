//! Precondition checks for scheduled sessions.
//!
//! A session leaves SCHEDULED only once everything outside the scheduler's
//! control is in place on the designated agents: images pulled, volumes
//! mounted, networks plumbed. The repository answers whether those
//! preconditions have been satisfied; a session that is not ready yet is
//! parked in CHECKING_PRECONDITION and revisited on the next tick.

use std::sync::Arc;

use async_trait::async_trait;
use sokovan_events::LifecycleEventKind;
use sokovan_id::ScalingGroup;

use crate::errors::SchedulerResult;
use crate::lifecycle::{
    ExecutionResult, LifecycleHandler, SessionOutcome, Transition, TransitionTable,
};
use crate::model::{KernelStatus, SessionStatus, SessionWorkload};
use crate::repository::SchedulerRepository;
use crate::retry::RetryPolicy;

pub struct CheckPreconditionHandler {
    repository: Arc<dyn SchedulerRepository>,
    retry: RetryPolicy,
}

impl CheckPreconditionHandler {
    pub fn new(repository: Arc<dyn SchedulerRepository>, retry: RetryPolicy) -> Self {
        Self { repository, retry }
    }
}

#[async_trait]
impl LifecycleHandler for CheckPreconditionHandler {
    fn name(&self) -> &'static str {
        "check-precondition"
    }

    fn target_statuses(&self) -> &'static [SessionStatus] {
        &[SessionStatus::Scheduled, SessionStatus::CheckingPrecondition]
    }

    fn transitions(&self) -> TransitionTable {
        TransitionTable {
            success: Transition {
                session: Some(SessionStatus::Preparing),
                kernel: Some(KernelStatus::Preparing),
                event: Some(LifecycleEventKind::Preparing),
            },
            need_retry: Transition {
                session: Some(SessionStatus::CheckingPrecondition),
                kernel: None,
                event: None,
            },
            expired: Transition::NONE,
            give_up: Transition::NONE,
        }
    }

    async fn execute(
        &self,
        _scaling_group: &ScalingGroup,
        sessions: Vec<SessionWorkload>,
    ) -> SchedulerResult<ExecutionResult> {
        let mut result = ExecutionResult::default();
        for session in sessions {
            let ready = self
                .retry
                .run("preconditions_satisfied", || {
                    self.repository.preconditions_satisfied(session.session_id)
                })
                .await?;
            if ready {
                result.successes.push(SessionOutcome::new(session.session_id));
            } else {
                result
                    .need_retry
                    .push(SessionOutcome::new(session.session_id));
            }
        }
        Ok(result)
    }
}
