//! # sokovan-events
//!
//! Lifecycle event definitions and the producer seam for the sokovan
//! scheduler core.
//!
//! ## Design Principles
//!
//! - Events are immutable records of applied state transitions
//! - The core only supplies (session id, event name, reason, exit code);
//!   the transport and full payload schema belong to the host process
//! - Every event names exactly one session
//! - Event names are stable strings for downstream routing
//!
//! ## Event Names
//!
//! Events are organized by lifecycle stage:
//! - Scheduling (`session.scheduled`, `session.schedule_retried`, ...)
//! - Preparation (`session.preparing`, `session.prepared`)
//! - Execution (`session.started`, `session.terminated`, ...)
//! - Policy (`session.deprioritized`, `session.abandoned`)

mod error;
mod producer;
mod types;

pub use error::EventError;
pub use producer::EventProducer;
pub use types::*;
