//! # sokovan-scheduler
//!
//! The session scheduler core: allocates resource slots across a fleet of
//! agents, orders competing workloads by pluggable priority policies, and
//! drives sessions through their lifecycle state machine.
//!
//! This crate is a library invoked by a host process. It owns the
//! scheduling decisions; persistence, transport, and locking backends are
//! constructor-injected seams:
//!
//! - [`repository::SchedulerRepository`]: transactional store for
//!   sessions, agents, and fair-share state
//! - [`sokovan_events::EventProducer`]: lifecycle event sink
//! - [`lock::LockProvider`]: cluster-wide handler mutual exclusion
//!
//! The public entry points are [`Sokovan::run_scheduling_tick`] and
//! [`Sokovan::run_lifecycle_tick`]; [`worker::SokovanWorker`] wraps them in
//! a periodic tokio driver for hosts that want one.

pub mod allocator;
pub mod config;
pub mod errors;
pub mod fairshare;
pub mod lifecycle;
pub mod lock;
pub mod model;
pub mod prioritizer;
pub mod repository;
pub mod retry;
pub mod scheduler;
pub mod worker;

mod facade;

pub use errors::{SchedulerError, SchedulerResult};
pub use facade::Sokovan;
pub use lifecycle::TickReport;
