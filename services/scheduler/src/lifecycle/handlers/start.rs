//! Kernel start dispatch.
//!
//! Sessions whose preconditions are satisfied get their kernel creation
//! dispatched to the designated agents. Dispatch is fire-and-forget from
//! the coordinator's point of view; the agents report back through status
//! updates the repository observes.

use std::sync::Arc;

use async_trait::async_trait;
use sokovan_events::LifecycleEventKind;
use sokovan_id::ScalingGroup;
use tracing::warn;

use crate::errors::SchedulerResult;
use crate::lifecycle::{
    ExecutionResult, LifecycleHandler, SessionOutcome, Transition, TransitionTable,
};
use crate::model::{KernelStatus, SessionStatus, SessionWorkload};
use crate::repository::SchedulerRepository;
use crate::retry::RetryPolicy;

pub struct StartHandler {
    repository: Arc<dyn SchedulerRepository>,
    retry: RetryPolicy,
}

impl StartHandler {
    pub fn new(repository: Arc<dyn SchedulerRepository>, retry: RetryPolicy) -> Self {
        Self { repository, retry }
    }
}

#[async_trait]
impl LifecycleHandler for StartHandler {
    fn name(&self) -> &'static str {
        "start"
    }

    fn target_statuses(&self) -> &'static [SessionStatus] {
        &[SessionStatus::Preparing]
    }

    fn target_kernel_statuses(&self) -> Option<&'static [KernelStatus]> {
        Some(&[KernelStatus::Prepared])
    }

    fn transitions(&self) -> TransitionTable {
        TransitionTable {
            success: Transition {
                session: Some(SessionStatus::Creating),
                kernel: Some(KernelStatus::Creating),
                event: Some(LifecycleEventKind::Creating),
            },
            need_retry: Transition::NONE,
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
            match self
                .retry
                .run("dispatch_start", || {
                    self.repository.dispatch_start(session.session_id)
                })
                .await
            {
                Ok(()) => result.successes.push(SessionOutcome::new(session.session_id)),
                Err(error) => {
                    warn!(
                        session_id = %session.session_id,
                        %error,
                        "Start dispatch failed, will retry on the next tick"
                    );
                    result
                        .need_retry
                        .push(SessionOutcome::new(session.session_id));
                }
            }
        }
        Ok(result)
    }
}
