//! Event bus for assistant events
//!
//! Tokio broadcast pub/sub. Publishing with no subscriber is fine; slow
//! subscribers lag and lose the oldest events rather than blocking the
//! engine.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use super::types::AssistantEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for event bus operations
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Subscriber lagged, {0} events dropped")]
    Lagged(u64),

    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

pub struct EventBus {
    sender: broadcast::Sender<AssistantEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: AssistantEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => trace!(event_type, receivers, "Event published"),
            Err(_) => trace!(event_type, "Event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AssistantEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub room_id: Option<String>,
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room(mut self, room_id: &str) -> Self {
        self.room_id = Some(room_id.to_string());
        self
    }

    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    pub fn matches(&self, event: &AssistantEvent) -> bool {
        // Room-less events (settings) pass a room filter
        if let (Some(wanted), Some(room)) = (&self.room_id, event.room_id()) {
            if wanted != room {
                return false;
            }
        }
        if let Some(types) = &self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        true
    }
}

/// Receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<AssistantEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<AssistantEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> EventBusResult<AssistantEvent> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Lagged(n) => EventBusError::Lagged(n),
                broadcast::error::RecvError::Closed => EventBusError::ChannelClosed,
            })?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::TriggerKind;
    use chrono::Utc;

    fn declined(room: &str) -> AssistantEvent {
        AssistantEvent::Declined {
            room_id: room.to_string(),
            trigger_kind: TriggerKind::Idle,
            justification: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(declined("r1"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(declined("r1"));
        assert_eq!(rx1.recv().await.unwrap().event_type(), "declined");
        assert_eq!(rx2.recv().await.unwrap().event_type(), "declined");
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().room("target").types(vec!["declined"]));

        bus.publish(declined("other"));
        bus.publish(AssistantEvent::RoomReset {
            room_id: "target".into(),
            epoch: 3,
            timestamp: Utc::now(),
        });
        bus.publish(declined("target"));

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.room_id(), Some("target"));
        assert_eq!(event.event_type(), "declined");
    }
}
