//! Session and kernel lifecycle statuses.
//!
//! Transitions are declared by lifecycle handlers and applied only by the
//! coordinator; no other component writes a status.

use serde::{Deserialize, Serialize};

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Scheduled,
    CheckingPrecondition,
    Preparing,
    Creating,
    Running,
    Terminating,
    Terminated,
    Cancelled,
    Deprioritizing,
}

impl SessionStatus {
    /// True for statuses no handler will ever pick up again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Terminated | SessionStatus::Cancelled)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Pending => "PENDING",
            SessionStatus::Scheduled => "SCHEDULED",
            SessionStatus::CheckingPrecondition => "CHECKING_PRECONDITION",
            SessionStatus::Preparing => "PREPARING",
            SessionStatus::Creating => "CREATING",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Terminating => "TERMINATING",
            SessionStatus::Terminated => "TERMINATED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::Deprioritizing => "DEPRIORITIZING",
        };
        write!(f, "{s}")
    }
}

/// Kernel lifecycle status, mirroring the session statuses it can share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KernelStatus {
    Pending,
    Scheduled,
    Preparing,
    Prepared,
    Creating,
    Running,
    Terminating,
    Terminated,
    Cancelled,
}

impl std::fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            KernelStatus::Pending => "PENDING",
            KernelStatus::Scheduled => "SCHEDULED",
            KernelStatus::Preparing => "PREPARING",
            KernelStatus::Prepared => "PREPARED",
            KernelStatus::Creating => "CREATING",
            KernelStatus::Running => "RUNNING",
            KernelStatus::Terminating => "TERMINATING",
            KernelStatus::Terminated => "TERMINATED",
            KernelStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Terminated.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Deprioritizing.is_terminal());
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&SessionStatus::CheckingPrecondition).unwrap();
        assert_eq!(json, "\"CHECKING_PRECONDITION\"");
    }
}
