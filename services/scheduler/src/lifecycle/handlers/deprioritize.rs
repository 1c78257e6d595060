//! The deprioritize handler.
//!
//! Lowers priority for sessions routed here by give-up decisions, then
//! requeues them as pending so the next scheduling tick re-attempts them
//! at lower priority. Deprioritization always succeeds as an operation
//! even though the underlying scheduling problem is unresolved, so the
//! expired and give-up transitions are never produced.

use std::sync::Arc;

use async_trait::async_trait;
use sokovan_events::LifecycleEventKind;
use sokovan_id::{ScalingGroup, SessionId};
use tracing::debug;

use crate::errors::SchedulerResult;
use crate::lifecycle::{
    ExecutionResult, LifecycleHandler, SessionOutcome, Transition, TransitionTable,
};
use crate::model::{SessionStatus, SessionWorkload};
use crate::repository::SchedulerRepository;
use crate::retry::RetryPolicy;

pub struct DeprioritizeHandler {
    repository: Arc<dyn SchedulerRepository>,
    retry: RetryPolicy,
}

impl DeprioritizeHandler {
    pub fn new(repository: Arc<dyn SchedulerRepository>, retry: RetryPolicy) -> Self {
        Self { repository, retry }
    }
}

#[async_trait]
impl LifecycleHandler for DeprioritizeHandler {
    fn name(&self) -> &'static str {
        "deprioritize"
    }

    fn target_statuses(&self) -> &'static [SessionStatus] {
        &[SessionStatus::Deprioritizing]
    }

    fn transitions(&self) -> TransitionTable {
        TransitionTable {
            success: Transition {
                session: Some(SessionStatus::Pending),
                kernel: None,
                event: Some(LifecycleEventKind::Deprioritized),
            },
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

        let ids: Vec<SessionId> = sessions.iter().map(|s| s.session_id).collect();
        self.retry
            .run("deprioritize", || {
                self.repository
                    .deprioritize(&ids, params.deprioritize_amount, params.priority_floor)
            })
            .await?;
        debug!(
            count = ids.len(),
            amount = params.deprioritize_amount,
            floor = params.priority_floor,
            "Lowered session priorities"
        );

        Ok(ExecutionResult {
            successes: ids
                .into_iter()
                .map(|id| SessionOutcome::with_reason(id, "deprioritized-and-requeued"))
                .collect(),
            ..ExecutionResult::default()
        })
    }
}
