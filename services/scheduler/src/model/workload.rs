//! The scheduler's unit of placement.
//!
//! A `SessionWorkload` is constructed from persisted session and kernel
//! rows at the start of each attempt and discarded afterwards; all durable
//! state lives in the repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sokovan_id::{AccessKey, AgentId, DomainName, KernelId, ProjectId, ScalingGroup, SessionId, UserId};
use sokovan_resources::ResourceSlot;

use super::SessionStatus;

/// Kind of session being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Interactive,
    Batch,
    Inference,
}

/// Whether all kernels must land on one agent or may spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    SingleNode,
    MultiNode,
}

/// Container image reference with its target architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub canonical: String,
    /// Architecture the image was built for, e.g. `x86_64`, `aarch64`.
    pub architecture: String,
}

/// One kernel's share of a session's resource demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelWorkload {
    pub kernel_id: KernelId,
    pub image: ImageRef,
    pub requested_slots: ResourceSlot,
    /// Operator-pinned agent for this kernel, if any.
    pub designated_agent: Option<AgentId>,
}

/// An immutable request-for-resources unit, one per pending session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionWorkload {
    pub session_id: SessionId,
    pub access_key: AccessKey,
    pub user: UserId,
    pub project: ProjectId,
    pub domain: DomainName,
    pub scaling_group: ScalingGroup,
    pub status: SessionStatus,
    pub session_type: SessionType,
    pub cluster_mode: ClusterMode,
    /// Mutable only via deprioritization; floored at a configured minimum.
    pub priority: i32,
    pub requested_slots: ResourceSlot,
    pub created_at: DateTime<Utc>,
    /// Deadline after which an unscheduled workload expires.
    pub starts_at: Option<DateTime<Utc>>,
    /// Session-level agent pin; kernel pins take precedence where set.
    pub designated_agent: Option<AgentId>,
    pub kernels: Vec<KernelWorkload>,
    /// Failed scheduling attempts so far.
    pub retries: u32,
    /// Times the session has been routed through deprioritization.
    pub deprioritized_count: u32,
}

impl SessionWorkload {
    /// True if the session-level slot total matches the kernel sum.
    ///
    /// The repository is expected to uphold this; the scheduler checks it
    /// as a policy violation rather than trusting the row blindly.
    #[must_use]
    pub fn slots_consistent(&self) -> bool {
        let kernel_sum: ResourceSlot = self.kernels.iter().map(|k| &k.requested_slots).sum();
        kernel_sum == self.requested_slots
    }

    /// True if the `starts_at` deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.is_some_and(|deadline| now > deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sokovan_resources::SlotName;

    fn slots(cpu: u64) -> ResourceSlot {
        [(SlotName::parse("cpu").unwrap(), Decimal::from(cpu))]
            .into_iter()
            .collect()
    }

    fn workload(kernel_cpus: &[u64], total_cpu: u64) -> SessionWorkload {
        SessionWorkload {
            session_id: SessionId::new(),
            access_key: AccessKey::parse("AKTEST").unwrap(),
            user: UserId::new(),
            project: ProjectId::new(),
            domain: DomainName::parse("default").unwrap(),
            scaling_group: ScalingGroup::parse("default").unwrap(),
            status: SessionStatus::Pending,
            session_type: SessionType::Interactive,
            cluster_mode: ClusterMode::SingleNode,
            priority: 10,
            requested_slots: slots(total_cpu),
            created_at: Utc::now(),
            starts_at: None,
            designated_agent: None,
            kernels: kernel_cpus
                .iter()
                .map(|c| KernelWorkload {
                    kernel_id: KernelId::new(),
                    image: ImageRef {
                        canonical: "python:3.13".to_string(),
                        architecture: "x86_64".to_string(),
                    },
                    requested_slots: slots(*c),
                    designated_agent: None,
                })
                .collect(),
            retries: 0,
            deprioritized_count: 0,
        }
    }

    #[test]
    fn slot_consistency() {
        assert!(workload(&[1, 2], 3).slots_consistent());
        assert!(!workload(&[1, 2], 4).slots_consistent());
    }

    #[test]
    fn expiry_requires_deadline() {
        let mut w = workload(&[1], 1);
        assert!(!w.is_expired(Utc::now()));
        w.starts_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(w.is_expired(Utc::now()));
    }
}
