//! Session termination.
//!
//! Terminating sessions get their kernel shutdowns dispatched and their
//! allocations released so the freed capacity is visible to the very next
//! scheduling tick. Release happens only after dispatch succeeds so a
//! failed dispatch leaves the allocation accounted for.

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

pub struct TerminateHandler {
    repository: Arc<dyn SchedulerRepository>,
    retry: RetryPolicy,
}

impl TerminateHandler {
    pub fn new(repository: Arc<dyn SchedulerRepository>, retry: RetryPolicy) -> Self {
        Self { repository, retry }
    }
}

#[async_trait]
impl LifecycleHandler for TerminateHandler {
    fn name(&self) -> &'static str {
        "terminate"
    }

    fn target_statuses(&self) -> &'static [SessionStatus] {
        &[SessionStatus::Terminating]
    }

    fn transitions(&self) -> TransitionTable {
        TransitionTable {
            success: Transition {
                session: Some(SessionStatus::Terminated),
                kernel: Some(KernelStatus::Terminated),
                event: Some(LifecycleEventKind::Terminated),
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
                .run("dispatch_termination", || {
                    self.repository.dispatch_termination(session.session_id)
                })
                .await
            {
                Ok(()) => {
                    self.retry
                        .run("release_allocation", || {
                            self.repository.release_allocation(session.session_id)
                        })
                        .await?;
                    result.successes.push(SessionOutcome::new(session.session_id));
                }
                Err(error) => {
                    warn!(
                        session_id = %session.session_id,
                        %error,
                        "Termination dispatch failed, will retry on the next tick"
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
