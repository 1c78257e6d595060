//! The event producer seam.

use async_trait::async_trait;

use crate::{EventError, SchedulingEvent};

/// Sink for lifecycle events.
///
/// The backing transport (Redis stream, message queue, in-process bus) is
/// the host's choice; the core is constructor-injected with one of these
/// and never reaches for a global.
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Publishes one event. Failures are reported but must not corrupt the
    /// already-persisted transition the event describes.
    async fn produce(&self, event: SchedulingEvent) -> Result<(), EventError>;
}
