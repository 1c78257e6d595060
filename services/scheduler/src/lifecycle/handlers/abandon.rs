//! The abandon handler.
//!
//! Termination after repeated deprioritization is an explicit operator
//! policy, not something the scheduler does silently: sessions whose
//! deprioritized count exceeds the configured maximum are cancelled here,
//! with a reason, before the deprioritize handler would requeue them yet
//! again. Run this handler ahead of the deprioritize handler.

use std::sync::Arc;

use async_trait::async_trait;
use sokovan_events::LifecycleEventKind;
use sokovan_id::ScalingGroup;
use tracing::info;

use crate::errors::SchedulerResult;
use crate::lifecycle::{
    ExecutionResult, LifecycleHandler, SessionOutcome, Transition, TransitionTable,
};
use crate::model::{KernelStatus, SessionStatus, SessionWorkload};
use crate::repository::SchedulerRepository;
use crate::retry::RetryPolicy;

pub const ABANDON_REASON: &str = "max-deprioritization-exceeded";

pub struct AbandonHandler {
    repository: Arc<dyn SchedulerRepository>,
    retry: RetryPolicy,
}

impl AbandonHandler {
    pub fn new(repository: Arc<dyn SchedulerRepository>, retry: RetryPolicy) -> Self {
        Self { repository, retry }
    }
}

#[async_trait]
impl LifecycleHandler for AbandonHandler {
    fn name(&self) -> &'static str {
        "abandon"
    }

    fn target_statuses(&self) -> &'static [SessionStatus] {
        &[SessionStatus::Deprioritizing]
    }

    fn transitions(&self) -> TransitionTable {
        TransitionTable {
            success: Transition {
                session: Some(SessionStatus::Cancelled),
                kernel: Some(KernelStatus::Cancelled),
                event: Some(LifecycleEventKind::Abandoned),
            },
            // Below the threshold: left for the deprioritize handler.
            need_retry: Transition::NONE,
            expired: Transition::NONE,
            give_up: Transition::NONE,
        }
    }

    async fn execute(
        &self,
        scaling_group: &ScalingGroup,
        sessions: Vec<SessionWorkload>,
    ) -> SchedulerResult<ExecutionResult> {
        let params = self
            .retry
            .run("scheduler_params", || {
                self.repository.scheduler_params(scaling_group)
            })
            .await?;

        let mut result = ExecutionResult::default();
        for session in sessions {
            if session.deprioritized_count > params.max_deprioritized_count {
                info!(
                    session_id = %session.session_id,
                    deprioritized_count = session.deprioritized_count,
                    max = params.max_deprioritized_count,
                    "Abandoning session"
                );
                self.retry
                    .run("release_allocation", || {
                        self.repository.release_allocation(session.session_id)
                    })
                    .await?;
                result
                    .successes
                    .push(SessionOutcome::with_reason(session.session_id, ABANDON_REASON));
            } else {
                result
                    .need_retry
                    .push(SessionOutcome::new(session.session_id));
            }
        }
        Ok(result)
    }
}
