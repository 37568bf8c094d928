// Observer bus for a world instance
// The instance owns the bus; consumers subscribe and see every client's events

use std::sync::Arc;

use tokio::sync::broadcast;

use agesync_events::{ClientId, EventEnvelope};

/// Event sender that sessions use to publish events
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: broadcast::Sender<EventEnvelope>,
    client_id: ClientId,
}

impl EventSender {
    pub fn new(sender: broadcast::Sender<EventEnvelope>, client_id: ClientId) -> Self {
        Self { sender, client_id }
    }

    /// Publishing with no subscribers is not an error
    pub fn publish(&self, envelope: EventEnvelope) {
        let _ = self.sender.send(envelope);
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }
}

/// Central event bus that manages event distribution
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<EventEnvelope>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (EventBus { sender }, receiver)
    }

    pub fn create_sender(&self, client_id: ClientId) -> EventSender {
        EventSender::new(self.sender.clone(), client_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Shared event bus manager that owns the central event bus
#[derive(Debug, Clone)]
pub struct EventBusManager {
    pub(crate) event_bus: Arc<EventBus>,
}

impl EventBusManager {
    /// Create a new event bus manager
    pub fn new(capacity: usize) -> Self {
        let (event_bus, _) = EventBus::new(capacity);
        Self {
            event_bus: Arc::new(event_bus),
        }
    }

    /// Create an event sender for a specific client
    pub fn create_sender(&self, client_id: ClientId) -> EventSender {
        self.event_bus.create_sender(client_id)
    }

    /// Create a new event subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_bus.subscribe()
    }

    /// Get the number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.event_bus.subscriber_count()
    }
}

/// Create an event bus manager with default capacity
pub fn create_event_bus_manager() -> EventBusManager {
    EventBusManager::new(1024)
}
