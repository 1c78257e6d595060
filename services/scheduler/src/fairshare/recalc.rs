//! Periodic fair-share recalculation job.
//!
//! One background writer, many scheduler-tick readers: staleness up to one
//! recalculation interval is acceptable by design of the snapshot cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::errors::SchedulerResult;
use crate::lock::{LockProvider, LOCK_FAIR_SHARE_RECALC};
use crate::repository::SchedulerRepository;
use crate::retry::RetryPolicy;
use crate::SchedulerError;

use super::compute_snapshot;

/// Recomputes and persists fair-share snapshots for every configured
/// entity.
pub struct FairShareRecalculator {
    repository: Arc<dyn SchedulerRepository>,
    lock_provider: Arc<dyn LockProvider>,
    retry: RetryPolicy,
    lock_timeout: Duration,
}

impl FairShareRecalculator {
    /// Creates a recalculator over the given seams.
    pub fn new(
        repository: Arc<dyn SchedulerRepository>,
        lock_provider: Arc<dyn LockProvider>,
        retry: RetryPolicy,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            lock_provider,
            retry,
            lock_timeout,
        }
    }

    /// Runs one recalculation pass under the cluster-wide recalc lock.
    ///
    /// Returns the number of entities whose snapshots were refreshed.
    #[instrument(skip(self))]
    pub async fn recalculate_all(&self) -> SchedulerResult<usize> {
        let _guard = self
            .lock_provider
            .acquire(LOCK_FAIR_SHARE_RECALC, self.lock_timeout)
            .await
            .map_err(|_| SchedulerError::LockTimeout {
                lock_id: LOCK_FAIR_SHARE_RECALC,
            })?;

        let now = Utc::now();
        let specs = self
            .retry
            .run("fair_share_specs", || self.repository.fair_share_specs())
            .await?;
        let capacity = self
            .retry
            .run("cluster_capacity", || self.repository.cluster_capacity())
            .await?;

        let mut refreshed = Vec::with_capacity(specs.len());
        for (entity, spec) in specs {
            let since = now - chrono::Duration::days(i64::from(spec.lookback_days));
            let buckets = match self
                .retry
                .run("usage_buckets", || {
                    self.repository.usage_buckets(&entity, since)
                })
                .await
            {
                Ok(buckets) => buckets,
                Err(e) => {
                    // One entity's missing history must not starve the rest.
                    warn!(entity = %entity, error = %e, "Skipping entity in recalculation");
                    continue;
                }
            };
            let snapshot = compute_snapshot(&spec, &buckets, &capacity, now);
            debug!(
                entity = %entity,
                factor = %snapshot.factor,
                bucket_count = buckets.len(),
                "Recomputed fair-share factor"
            );
            refreshed.push((entity, snapshot));
        }

        let count = refreshed.len();
        self.retry
            .run("put_fair_share_snapshots", || {
                self.repository.put_fair_share_snapshots(&refreshed)
            })
            .await?;

        info!(entities = count, "Fair-share recalculation complete");
        Ok(count)
    }
}
