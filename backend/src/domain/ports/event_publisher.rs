//! Port for pushing application events to realtime subscribers.
use async_trait::async_trait;
use serde_json::Value;

use crate::domain::realtime::ServerEvent;

use super::define_port_error;

define_port_error! {
    /// Errors raised while fanning out realtime events.
    pub enum EventPublisherError {
        /// The payload could not be encoded as a wire frame.
        Encode { message: String } => "realtime event encoding failed: {message}",
        /// The delivery channel has shut down.
        Closed { message: String } => "realtime delivery closed: {message}",
    }
}

/// Publishes server events to connected realtime clients.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver `event` to every connected client. Returns how many
    /// connections received it.
    async fn publish(&self, event: ServerEvent, payload: Value)
    -> Result<usize, EventPublisherError>;

    /// Deliver `event` to the members of `room` only.
    async fn publish_to_room(
        &self,
        room: &str,
        event: ServerEvent,
        payload: Value,
    ) -> Result<usize, EventPublisherError>;
}

/// Publisher that drops every event, for deployments without a hub.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(
        &self,
        _event: ServerEvent,
        _payload: Value,
    ) -> Result<usize, EventPublisherError> {
        Ok(0)
    }

    async fn publish_to_room(
        &self,
        _room: &str,
        _event: ServerEvent,
        _payload: Value,
    ) -> Result<usize, EventPublisherError> {
        Ok(0)
    }
}
