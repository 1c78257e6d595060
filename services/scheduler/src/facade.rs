//! The assembled scheduler.
//!
//! [`Sokovan`] wires the repository, event producer, and lock provider
//! into the scheduler, the lifecycle coordinator, and the built-in
//! handler chain. Hosts construct one per process and drive it either
//! directly or through [`crate::worker::SokovanWorker`].

use std::sync::Arc;

use sokovan_events::EventProducer;
use sokovan_id::ScalingGroup;
use tracing::instrument;

use crate::config::SokovanConfig;
use crate::errors::{SchedulerError, SchedulerResult};
use crate::fairshare::FairShareRecalculator;
use crate::lifecycle::handlers::{
    AbandonHandler, CheckPreconditionHandler, DeprioritizeHandler, ScheduleHandler, StartHandler,
    TerminateHandler,
};
use crate::lifecycle::{LifecycleCoordinator, LifecycleHandler, TickReport};
use crate::lock::{LockProvider, ResourceLocks};
use crate::repository::SchedulerRepository;
use crate::retry::RetryPolicy;
use crate::scheduler::Scheduler;

/// The fully wired scheduler core.
pub struct Sokovan {
    repository: Arc<dyn SchedulerRepository>,
    coordinator: LifecycleCoordinator,
    recalculator: FairShareRecalculator,
    retry: RetryPolicy,
    // Ordered: the coordinator runs these front to back each lifecycle
    // tick. Abandon must precede deprioritize so exhausted sessions are
    // cancelled instead of requeued one more time.
    handlers: Vec<Arc<dyn LifecycleHandler>>,
}

impl Sokovan {
    pub fn new(
        repository: Arc<dyn SchedulerRepository>,
        event_producer: Arc<dyn EventProducer>,
        lock_provider: Arc<dyn LockProvider>,
        config: SokovanConfig,
    ) -> Self {
        let retry = RetryPolicy::new(
            config.repository_retry_attempts,
            config.repository_retry_base_delay,
        );
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&repository),
            Arc::new(ResourceLocks::new()),
            retry.clone(),
            config.resource_lock_timeout,
        ));
        let coordinator = LifecycleCoordinator::new(
            Arc::clone(&repository),
            event_producer,
            Arc::clone(&lock_provider),
            retry.clone(),
            config.lock_timeout,
        );
        let recalculator = FairShareRecalculator::new(
            Arc::clone(&repository),
            lock_provider,
            retry.clone(),
            config.lock_timeout,
        );
        let handlers: Vec<Arc<dyn LifecycleHandler>> = vec![
            Arc::new(ScheduleHandler::new(scheduler)),
            Arc::new(CheckPreconditionHandler::new(
                Arc::clone(&repository),
                retry.clone(),
            )),
            Arc::new(StartHandler::new(Arc::clone(&repository), retry.clone())),
            Arc::new(AbandonHandler::new(Arc::clone(&repository), retry.clone())),
            Arc::new(DeprioritizeHandler::new(
                Arc::clone(&repository),
                retry.clone(),
            )),
            Arc::new(TerminateHandler::new(
                Arc::clone(&repository),
                retry.clone(),
            )),
        ];
        Self {
            repository,
            coordinator,
            recalculator,
            retry,
            handlers,
        }
    }

    /// Names of the built-in handlers, in execution order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Scaling groups that currently accept scheduling.
    pub async fn schedulable_scaling_groups(&self) -> SchedulerResult<Vec<ScalingGroup>> {
        Ok(self
            .retry
            .run("schedulable_scaling_groups", || {
                self.repository.schedulable_scaling_groups()
            })
            .await?)
    }

    /// Runs one scheduling tick (the schedule handler only) for a single
    /// scaling group.
    #[instrument(skip(self), fields(scaling_group = %scaling_group))]
    pub async fn run_scheduling_tick(
        &self,
        scaling_group: &ScalingGroup,
    ) -> SchedulerResult<TickReport> {
        self.coordinator
            .run_handler(self.handlers[0].as_ref(), scaling_group)
            .await
    }

    /// Runs one tick of the named handler across every schedulable
    /// scaling group, merging the per-group reports.
    #[instrument(skip(self))]
    pub async fn run_lifecycle_tick(&self, handler_name: &str) -> SchedulerResult<TickReport> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.name() == handler_name)
            .ok_or_else(|| SchedulerError::UnknownHandler(handler_name.to_owned()))?;

        let mut report = TickReport::default();
        for scaling_group in self.schedulable_scaling_groups().await? {
            let group_report = self
                .coordinator
                .run_handler(handler.as_ref(), &scaling_group)
                .await?;
            report.merge(&group_report);
        }
        Ok(report)
    }

    /// Refreshes fair-share snapshots for every configured entity.
    pub async fn recalculate_fair_share(&self) -> SchedulerResult<usize> {
        self.recalculator.recalculate_all().await
    }
}
