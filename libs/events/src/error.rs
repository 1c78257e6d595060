//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when producing events.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// The event name is unknown.
    #[error("unknown event name: {0}")]
    UnknownEventName(String),

    /// The event payload is invalid.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backing producer rejected or lost the event.
    #[error("producer error: {0}")]
    Producer(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
