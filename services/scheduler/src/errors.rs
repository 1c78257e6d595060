//! Error taxonomy for the scheduler core.
//!
//! Business outcomes (resource insufficiency, policy violations, commit
//! conflicts) are *values* classified per session inside a tick; they never
//! escape `execute()` as errors. Only infrastructure failures propagate out
//! of a tick, which then retries from scratch on the next timer firing.

use sokovan_id::SessionId;
use thiserror::Error;

use crate::lock::LockId;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that abort a tick (or one session's transition within it).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The repository (backing store) failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// The handler's cluster-wide lock could not be acquired in time.
    /// The tick is abandoned and retried on the next timer firing.
    #[error("lock acquisition timed out for {lock_id}")]
    LockTimeout { lock_id: LockId },

    /// A handler broke its contract for one session (e.g. reported it in
    /// two outcome categories). Fatal to that session's transition only.
    #[error("handler invariant violated for {session_id}: {message}")]
    HandlerInvariant {
        session_id: SessionId,
        message: String,
    },

    /// No scheduler parameters are configured for a scaling group.
    #[error("unknown scaling group: {0}")]
    UnknownScalingGroup(String),

    /// A lifecycle tick was requested for a handler name that is not
    /// registered.
    #[error("unknown lifecycle handler: {0}")]
    UnknownHandler(String),
}

/// Errors surfaced by the repository seam.
#[derive(Debug, Error, Clone)]
pub enum RepositoryError {
    /// Optimistic concurrency conflict: another actor won the race on the
    /// same rows. Retryable once in-tick on the allocation path.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing store is unavailable or timed out. Retryable by policy.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other repository failure.
    #[error("internal repository error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// True if the error is a commit-race conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict(_))
    }

    /// True if retrying the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RepositoryError::Conflict(_) | RepositoryError::Unavailable(_)
        )
    }
}
