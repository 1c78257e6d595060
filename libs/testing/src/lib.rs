//! # sokovan-testing
//!
//! In-memory implementations of the scheduler's backend seams, plus
//! fluent builders for workloads and agents. Everything here backs the
//! scheduler crate's own test suites and is useful to hosts testing
//! their integration without a database.

mod builders;
mod events;
mod lock;
mod repository;

pub use builders::{slots, AgentBuilder, WorkloadBuilder};
pub use events::RecordingEventProducer;
pub use lock::MemoryLockProvider;
pub use repository::InMemoryRepository;
