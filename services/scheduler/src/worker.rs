//! Scheduler background worker.
//!
//! Runs scheduling and lifecycle ticks on a periodic interval, and
//! fair-share recalculation on its own coarser interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::facade::Sokovan;
use crate::lifecycle::TickReport;

// Lifecycle handlers after scheduling, in execution order. Abandon must
// run before deprioritize so exhausted sessions are cancelled instead of
// requeued one more time.
const LIFECYCLE_ORDER: &[&str] = &[
    "check-precondition",
    "start",
    "abandon",
    "deprioritize",
    "terminate",
];

/// Background worker driving [`Sokovan`] until shutdown is signaled.
pub struct SokovanWorker {
    sokovan: Arc<Sokovan>,
    tick_interval: Duration,
    fair_share_interval: Duration,
}

impl SokovanWorker {
    pub fn new(
        sokovan: Arc<Sokovan>,
        tick_interval: Duration,
        fair_share_interval: Duration,
    ) -> Self {
        Self {
            sokovan,
            tick_interval,
            fair_share_interval,
        }
    }

    /// Run the worker until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_interval_secs = self.tick_interval.as_secs(),
            fair_share_interval_secs = self.fair_share_interval.as_secs(),
            "Starting scheduler worker"
        );

        let mut tick = tokio::time::interval(self.tick_interval);
        let mut fair_share = tokio::time::interval(self.fair_share_interval);
        // Don't immediately tick on startup - wait for first interval
        tick.tick().await;
        fair_share.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.run_tick().await;
                }
                _ = fair_share.tick() => {
                    match self.sokovan.recalculate_fair_share().await {
                        Ok(refreshed) if refreshed > 0 => {
                            info!(refreshed, "Fair-share snapshots refreshed");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Fair-share recalculation failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Scheduler worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one full pass: concurrent per-group scheduling, then each
    /// lifecycle handler in order across all groups.
    async fn run_tick(&self) {
        let groups = match self.sokovan.schedulable_scaling_groups().await {
            Ok(groups) => groups,
            Err(e) => {
                error!(error = %e, "Failed to list schedulable scaling groups");
                return;
            }
        };

        // Each group holds its own resource lock, so groups schedule
        // concurrently without contending.
        let mut report = TickReport::default();
        let schedules = groups
            .iter()
            .map(|group| self.sokovan.run_scheduling_tick(group));
        for (group, result) in groups
            .iter()
            .zip(futures_util::future::join_all(schedules).await)
        {
            match result {
                Ok(group_report) => report.merge(&group_report),
                Err(e) => warn!(scaling_group = %group, error = %e, "Scheduling tick failed"),
            }
        }

        for handler_name in LIFECYCLE_ORDER {
            match self.sokovan.run_lifecycle_tick(handler_name).await {
                Ok(handler_report) => report.merge(&handler_report),
                Err(e) => warn!(handler = handler_name, error = %e, "Lifecycle tick failed"),
            }
        }

        if !report.is_quiet() {
            info!(
                scheduled = report.scheduled,
                retried = report.retried,
                given_up = report.given_up,
                expired = report.expired,
                invariant_errors = report.invariant_errors,
                "Scheduler tick complete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_order_runs_abandon_before_deprioritize() {
        let abandon = LIFECYCLE_ORDER.iter().position(|h| *h == "abandon");
        let deprioritize = LIFECYCLE_ORDER.iter().position(|h| *h == "deprioritize");
        assert!(abandon.unwrap() < deprioritize.unwrap());
    }
}
