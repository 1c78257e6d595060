//! Lifecycle event definitions.
//!
//! Each event carries the session it concerns plus an optional operator
//! reason and exit code. Events are emitted by the lifecycle coordinator
//! after a transition batch is persisted, never before.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sokovan_id::SessionId;

/// All event names as constants.
pub mod event_names {
    // Scheduling
    pub const SESSION_SCHEDULED: &str = "session.scheduled";
    pub const SESSION_SCHEDULE_RETRIED: &str = "session.schedule_retried";
    pub const SESSION_DEPRIORITIZED: &str = "session.deprioritized";

    // Preparation
    pub const SESSION_PREPARING: &str = "session.preparing";
    pub const SESSION_PREPARED: &str = "session.prepared";

    // Execution
    pub const SESSION_CREATING: &str = "session.creating";
    pub const SESSION_STARTED: &str = "session.started";
    pub const SESSION_TERMINATING: &str = "session.terminating";
    pub const SESSION_TERMINATED: &str = "session.terminated";
    pub const SESSION_CANCELLED: &str = "session.cancelled";

    // Policy
    pub const SESSION_ABANDONED: &str = "session.abandoned";
}

/// The kind of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Scheduled,
    ScheduleRetried,
    Deprioritized,
    Preparing,
    Prepared,
    Creating,
    Started,
    Terminating,
    Terminated,
    Cancelled,
    Abandoned,
}

impl LifecycleEventKind {
    /// Stable event name for downstream routing.
    #[must_use]
    pub fn name(&self) -> &'static str {
        use event_names::*;
        match self {
            Self::Scheduled => SESSION_SCHEDULED,
            Self::ScheduleRetried => SESSION_SCHEDULE_RETRIED,
            Self::Deprioritized => SESSION_DEPRIORITIZED,
            Self::Preparing => SESSION_PREPARING,
            Self::Prepared => SESSION_PREPARED,
            Self::Creating => SESSION_CREATING,
            Self::Started => SESSION_STARTED,
            Self::Terminating => SESSION_TERMINATING,
            Self::Terminated => SESSION_TERMINATED,
            Self::Cancelled => SESSION_CANCELLED,
            Self::Abandoned => SESSION_ABANDONED,
        }
    }
}

impl std::fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A lifecycle event as supplied by the scheduler core.
///
/// The host's event bus owns the full wire payload; the core only fills in
/// these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingEvent {
    pub session_id: SessionId,
    pub kind: LifecycleEventKind,
    /// Operator-visible reason text, e.g. `"no-available-instances"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Exit code for terminal events, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub occurred_at: DateTime<Utc>,
}

impl SchedulingEvent {
    /// Creates an event with no reason or exit code.
    #[must_use]
    pub fn new(session_id: SessionId, kind: LifecycleEventKind) -> Self {
        Self {
            session_id,
            kind,
            reason: None,
            exit_code: None,
            occurred_at: Utc::now(),
        }
    }

    /// Attaches a reason string.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an exit code.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_are_stable() {
        assert_eq!(LifecycleEventKind::Scheduled.name(), "session.scheduled");
        assert_eq!(LifecycleEventKind::Abandoned.name(), "session.abandoned");
    }

    #[test]
    fn serde_skips_absent_fields() {
        let ev = SchedulingEvent::new(SessionId::new(), LifecycleEventKind::Scheduled);
        let json = serde_json::to_value(&ev).unwrap();
        assert!(json.get("reason").is_none());
        assert!(json.get("exit_code").is_none());

        let ev = ev.with_reason("pending-timeout").with_exit_code(1);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["reason"], "pending-timeout");
        assert_eq!(json["exit_code"], 1);
    }
}
