//! Distributed lock seam and the in-process resource lock.
//!
//! Handlers that must not run concurrently with themselves across manager
//! replicas declare a [`LockId`]; the backing technology (DB advisory lock,
//! Redis, etcd) is the host's choice behind [`LockProvider`]. Guards are
//! RAII: release happens on drop on every exit path, including
//! cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sokovan_id::ScalingGroup;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Identifier for a cluster-wide advisory lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId(pub u32);

/// Base lock id for the scheduling handler; scoped per scaling group so
/// one group's pass never blocks another's.
pub const LOCK_SCHEDULE: LockId = LockId(91);
/// Lock id for the fair-share recalculation job.
pub const LOCK_FAIR_SHARE_RECALC: LockId = LockId(92);

impl LockId {
    /// Derives a lock id scoped to `name` from this base id.
    ///
    /// FNV-1a over the base id and the name, so replicas on different
    /// hosts derive the same id for the same (handler, scaling group)
    /// pair.
    #[must_use]
    pub fn scoped(self, name: &str) -> LockId {
        let mut hash: u32 = 0x811c_9dc5;
        for byte in self.0.to_be_bytes().into_iter().chain(name.bytes()) {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(0x0100_0193);
        }
        LockId(hash)
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lock#{}", self.0)
    }
}

/// Errors from the lock provider.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was not acquired within the bounded timeout.
    #[error("timed out acquiring {0}")]
    Timeout(LockId),

    /// The lock backend failed.
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// A held cluster-wide lock; released on drop.
pub trait LockGuard: Send {}

/// Supplier of cluster-wide advisory locks.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Acquires `lock_id`, waiting at most `timeout`.
    async fn acquire(
        &self,
        lock_id: LockId,
        timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, LockError>;
}

/// Per-scaling-group mutexes serializing decide+commit on the allocation
/// path within this process.
///
/// The capacity read, the placement decision, and the allocation write must
/// be atomic with respect to other allocation attempts in the same scaling
/// group; the repository's conflict detection is only the secondary guard.
#[derive(Default)]
pub struct ResourceLocks {
    locks: Mutex<HashMap<ScalingGroup, Arc<Mutex<()>>>>,
}

impl ResourceLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for a scaling group with a bounded timeout.
    ///
    /// The returned guard releases on drop, including task cancellation.
    pub async fn acquire(
        &self,
        scaling_group: &ScalingGroup,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, LockError> {
        let lock = {
            let mut table = self.locks.lock().await;
            table
                .entry(scaling_group.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| LockError::Timeout(LockId(0)))
    }
}
