//! Scheduler configuration.
//!
//! Process-wide knobs come from `SOKOVAN_*` environment variables with
//! defaults suitable for development. Per-scaling-group policy
//! (`SchedulerParams`) is owned by the repository so operators can change
//! it without restarting the manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::allocator::SelectionStrategy;
use crate::prioritizer::Prioritizer;

/// Process-wide scheduler configuration.
#[derive(Debug, Clone)]
pub struct SokovanConfig {
    /// Interval between worker ticks.
    pub tick_interval: Duration,
    /// Bound on distributed lock acquisition per handler tick.
    pub lock_timeout: Duration,
    /// Bound on the per-scaling-group resource lock during decide+commit.
    pub resource_lock_timeout: Duration,
    /// Interval between fair-share snapshot recalculations. Much coarser
    /// than the tick interval; decayed usage moves slowly.
    pub fair_share_interval: Duration,
    /// Repository call retry attempts.
    pub repository_retry_attempts: u32,
    /// Base backoff delay between repository retries.
    pub repository_retry_base_delay: Duration,
}

impl Default for SokovanConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            lock_timeout: Duration::from_secs(30),
            resource_lock_timeout: Duration::from_secs(30),
            fair_share_interval: Duration::from_secs(300),
            repository_retry_attempts: 3,
            repository_retry_base_delay: Duration::from_millis(100),
        }
    }
}

impl SokovanConfig {
    /// Loads configuration from `SOKOVAN_*` environment variables,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_interval: env_secs("SOKOVAN_TICK_INTERVAL_SECS", defaults.tick_interval),
            lock_timeout: env_secs("SOKOVAN_LOCK_TIMEOUT_SECS", defaults.lock_timeout),
            resource_lock_timeout: env_secs(
                "SOKOVAN_RESOURCE_LOCK_TIMEOUT_SECS",
                defaults.resource_lock_timeout,
            ),
            fair_share_interval: env_secs(
                "SOKOVAN_FAIR_SHARE_INTERVAL_SECS",
                defaults.fair_share_interval,
            ),
            repository_retry_attempts: env_u32(
                "SOKOVAN_REPOSITORY_RETRY_ATTEMPTS",
                defaults.repository_retry_attempts,
            ),
            repository_retry_base_delay: defaults.repository_retry_base_delay,
        }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

/// Per-scaling-group scheduling policy, supplied by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerParams {
    /// Ordering strategy for pending workloads.
    pub prioritizer: Prioritizer,
    /// Agent packing strategy.
    pub selection_strategy: SelectionStrategy,
    /// Whether multi-node kernels may spread across affinity zones.
    pub allow_fractional_resource_fragmentation: bool,
    /// Failed attempts before a pending session gives up and is routed to
    /// deprioritization.
    pub max_scheduling_retries: u32,
    /// Priority subtracted per deprioritization pass.
    pub deprioritize_amount: i32,
    /// Lower bound priorities are floored at.
    pub priority_floor: i32,
    /// Deprioritization rounds before the abandon handler terminates the
    /// session.
    pub max_deprioritized_count: u32,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            prioritizer: Prioritizer::Fifo,
            selection_strategy: SelectionStrategy::Dispersed,
            allow_fractional_resource_fragmentation: false,
            max_scheduling_retries: 5,
            deprioritize_amount: 10,
            priority_floor: 0,
            max_deprioritized_count: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let params = SchedulerParams::default();
        assert_eq!(params.max_scheduling_retries, 5);
        assert!(params.deprioritize_amount > 0);
        assert!(params.priority_floor <= 0);
    }

    #[test]
    fn env_fallback_on_garbage() {
        // Unset/garbage variables fall back to defaults rather than erroring.
        assert_eq!(
            env_secs("SOKOVAN_NO_SUCH_VARIABLE", Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }
}
