//! The generic lifecycle driver.
//!
//! For each handler: select sessions in its target statuses, optionally
//! hold its cluster-wide lock, run `execute`, then apply the declared
//! transition table per outcome category. All transitions are persisted
//! in one batch per tick. Re-running an interrupted tick is safe: only
//! sessions still in the matched statuses are reselected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sokovan_events::{EventProducer, SchedulingEvent};
use sokovan_id::{ScalingGroup, SessionId};
use tracing::{debug, info, instrument, warn};

use crate::errors::{SchedulerError, SchedulerResult};
use crate::lifecycle::{ExecutionResult, LifecycleHandler, SessionOutcome, TickReport, Transition};
use crate::lock::LockProvider;
use crate::repository::{SchedulerRepository, StatusTransitionOp};
use crate::retry::RetryPolicy;

/// Drives lifecycle handlers and owns all status writes.
pub struct LifecycleCoordinator {
    repository: Arc<dyn SchedulerRepository>,
    event_producer: Arc<dyn EventProducer>,
    lock_provider: Arc<dyn LockProvider>,
    retry: RetryPolicy,
    lock_timeout: Duration,
}

impl LifecycleCoordinator {
    /// Creates a coordinator over the given seams.
    pub fn new(
        repository: Arc<dyn SchedulerRepository>,
        event_producer: Arc<dyn EventProducer>,
        lock_provider: Arc<dyn LockProvider>,
        retry: RetryPolicy,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            event_producer,
            lock_provider,
            retry,
            lock_timeout,
        }
    }

    /// Runs one tick of `handler` for one scaling group.
    #[instrument(skip(self, handler), fields(handler = handler.name(), scaling_group = %scaling_group))]
    pub async fn run_handler(
        &self,
        handler: &dyn LifecycleHandler,
        scaling_group: &ScalingGroup,
    ) -> SchedulerResult<TickReport> {
        // Held for the whole tick when declared; dropped on all exit paths.
        let _guard = match handler.lock_id(scaling_group) {
            Some(lock_id) => Some(
                self.lock_provider
                    .acquire(lock_id, self.lock_timeout)
                    .await
                    .map_err(|_| SchedulerError::LockTimeout { lock_id })?,
            ),
            None => None,
        };

        let sessions = self
            .retry
            .run("sessions_by_status", || {
                self.repository.sessions_by_status(
                    scaling_group,
                    handler.target_statuses(),
                    handler.target_kernel_statuses(),
                )
            })
            .await?;
        if sessions.is_empty() {
            return Ok(TickReport::default());
        }
        debug!(count = sessions.len(), "Selected sessions for handler");

        let selected: Vec<SessionId> = sessions.iter().map(|s| s.session_id).collect();
        let result = handler.execute(scaling_group, sessions).await?;

        self.apply(handler, &selected, &result).await
    }

    /// Applies the handler's transition table to an execution result.
    async fn apply(
        &self,
        handler: &dyn LifecycleHandler,
        selected: &[SessionId],
        result: &ExecutionResult,
    ) -> SchedulerResult<TickReport> {
        let table = handler.transitions();
        let categories: [(&[SessionOutcome], Transition); 4] = [
            (&result.successes, table.success),
            (&result.need_retry, table.need_retry),
            (&result.expired, table.expired),
            (&result.give_ups, table.give_up),
        ];

        // Exactly-once guard: a session reported twice (or never selected)
        // is a handler bug; its transition is skipped, the rest proceed.
        let mut seen: HashMap<SessionId, usize> = HashMap::new();
        for (outcomes, _) in &categories {
            for outcome in *outcomes {
                *seen.entry(outcome.session_id).or_default() += 1;
            }
        }
        let mut invariant_errors = 0usize;
        let mut valid = |session_id: SessionId| -> bool {
            let duplicated = seen.get(&session_id).copied().unwrap_or(0) > 1;
            let unknown = !selected.contains(&session_id);
            if duplicated || unknown {
                let err = SchedulerError::HandlerInvariant {
                    session_id,
                    message: if duplicated {
                        "reported in more than one outcome category".to_string()
                    } else {
                        "not among the selected sessions".to_string()
                    },
                };
                warn!(
                    handler = handler.name(),
                    error = %err,
                    "Skipping transition"
                );
                invariant_errors += 1;
                false
            } else {
                true
            }
        };

        let mut ops: Vec<StatusTransitionOp> = Vec::new();
        let mut events: Vec<SchedulingEvent> = Vec::new();
        for (outcomes, transition) in &categories {
            for outcome in *outcomes {
                if !valid(outcome.session_id) {
                    continue;
                }
                if transition.session.is_some() || transition.kernel.is_some() {
                    ops.push(StatusTransitionOp {
                        session_id: outcome.session_id,
                        session_status: transition.session,
                        kernel_status: transition.kernel,
                        reason: outcome.reason.clone(),
                    });
                }
                if let Some(kind) = transition.event {
                    let mut event = SchedulingEvent::new(outcome.session_id, kind);
                    event.reason = outcome.reason.clone();
                    event.exit_code = outcome.exit_code;
                    events.push(event);
                }
            }
        }

        if !ops.is_empty() {
            self.retry
                .run("transition_statuses", || {
                    self.repository.transition_statuses(&ops)
                })
                .await?;
        }

        // Events follow the persisted batch; a lost event never implies a
        // lost transition.
        for event in events {
            if let Err(e) = self.event_producer.produce(event).await {
                warn!(error = %e, "Failed to produce lifecycle event");
            }
        }

        let report = TickReport {
            scheduled: result.successes.len().saturating_sub(count_invalid(&result.successes, &seen, selected)),
            retried: result.need_retry.len().saturating_sub(count_invalid(&result.need_retry, &seen, selected)),
            given_up: result.give_ups.len().saturating_sub(count_invalid(&result.give_ups, &seen, selected)),
            expired: result.expired.len().saturating_sub(count_invalid(&result.expired, &seen, selected)),
            invariant_errors,
        };
        info!(
            handler = handler.name(),
            scheduled = report.scheduled,
            retried = report.retried,
            given_up = report.given_up,
            expired = report.expired,
            invariant_errors = report.invariant_errors,
            "Lifecycle tick complete"
        );
        Ok(report)
    }
}

fn count_invalid(
    outcomes: &[SessionOutcome],
    seen: &HashMap<SessionId, usize>,
    selected: &[SessionId],
) -> usize {
    outcomes
        .iter()
        .filter(|o| {
            seen.get(&o.session_id).copied().unwrap_or(0) > 1 || !selected.contains(&o.session_id)
        })
        .count()
}
