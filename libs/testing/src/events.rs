use std::sync::Mutex;

use async_trait::async_trait;
use sokovan_events::{EventError, EventProducer, LifecycleEventKind, SchedulingEvent};
use sokovan_id::SessionId;

/// Event producer that records everything it is handed.
#[derive(Default)]
pub struct RecordingEventProducer {
    events: Mutex<Vec<SchedulingEvent>>,
}

impl RecordingEventProducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events produced so far, in order.
    pub fn events(&self) -> Vec<SchedulingEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Event kinds recorded for one session, in order.
    pub fn kinds_for(&self, session_id: SessionId) -> Vec<LifecycleEventKind> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.session_id == session_id)
            .map(|e| e.kind)
            .collect()
    }
}

#[async_trait]
impl EventProducer for RecordingEventProducer {
    async fn produce(&self, event: SchedulingEvent) -> Result<(), EventError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
