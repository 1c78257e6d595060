use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sokovan_scheduler::lock::{LockError, LockGuard, LockId, LockProvider};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock provider backed by in-process mutexes.
///
/// Gives the same mutual-exclusion semantics as a real advisory lock
/// within a single test process.
#[derive(Default)]
pub struct MemoryLockProvider {
    locks: Mutex<HashMap<LockId, Arc<Mutex<()>>>>,
}

impl MemoryLockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryGuard {
    _guard: OwnedMutexGuard<()>,
}

impl LockGuard for MemoryGuard {}

#[async_trait]
impl LockProvider for MemoryLockProvider {
    async fn acquire(
        &self,
        lock_id: LockId,
        timeout: Duration,
    ) -> Result<Box<dyn LockGuard>, LockError> {
        let lock = {
            let mut table = self.locks.lock().await;
            table
                .entry(lock_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| LockError::Timeout(lock_id))?;
        Ok(Box::new(MemoryGuard { _guard: guard }))
    }
}
