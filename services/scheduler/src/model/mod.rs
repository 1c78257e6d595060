//! Domain model shared across the scheduler core.

mod agent;
mod snapshot;
mod status;
mod workload;

pub use agent::{AgentInfo, KernelAllocation};
pub use snapshot::{FairShareCalculationSnapshot, FairShareEntity, SystemSnapshot};
pub use status::{KernelStatus, SessionStatus};
pub use workload::{ClusterMode, ImageRef, KernelWorkload, SessionType, SessionWorkload};
