/// Core event types and identifiers for agesync
///
/// This crate provides the foundational vocabulary for the event system,
/// allowing the world, scripting and runner crates to share events without
/// circular dependencies.
use std::collections::HashMap;
use std::time::Instant;

pub mod ids;
pub mod system_events;
pub mod values;
pub mod world_events;

pub use ids::{AvatarId, ButtonId, ClientId, InstanceId, ObjectKey, RegionId, ResponderId, TimerId};
pub use system_events::{ScriptEventType, SystemEvent};
pub use values::{ScalarKind, SdlScalar, SdlValue};
pub use world_events::{Topic, WorldEvent};

// ============================================================================
// Event Source and Context
// ============================================================================

/// Source of the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Raw engine signal (region sensor, activator, multistage)
    Engine,
    /// Arrived through replication from another client
    Replication,
    /// Originated from a script (timer, responder completion)
    Script,
    /// Originated from system/lifecycle
    System,
}

/// Whether an engine signal was raised on this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// Raised locally, e.g. our own avatar crossed the region
    Local,
    /// Net-propagated from another client
    Remote(ClientId),
}

/// Context information attached to all events
#[derive(Debug, Clone)]
pub struct EventContext {
    /// Client that is processing this event
    pub client_id: ClientId,
    /// Sequence number for this event, relative to the client
    pub client_sequence: u64,
    /// Where the underlying signal was raised
    pub origin: EventOrigin,
    /// Additional metadata
    pub metadata: HashMap<String, String>,
}

impl EventContext {
    pub fn new(client_id: ClientId, client_sequence: u64) -> Self {
        Self {
            client_id,
            client_sequence,
            origin: EventOrigin::Local,
            metadata: HashMap::new(),
        }
    }

    pub fn with_origin(mut self, origin: EventOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_local(&self) -> bool {
        self.origin == EventOrigin::Local
    }
}

// ============================================================================
// Event Envelope
// ============================================================================

/// Unified event type
#[derive(Debug, Clone)]
pub enum EventType {
    World(WorldEvent),
    System(SystemEvent),
}

/// Complete event envelope
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub event: EventType,
    pub context: EventContext,
    pub timestamp: Instant,
    pub source: EventSource,
}

impl EventEnvelope {
    pub fn new(event: EventType, context: EventContext, source: EventSource) -> Self {
        Self {
            event,
            context,
            timestamp: Instant::now(),
            source,
        }
    }

    pub fn world_event(
        world_event: WorldEvent,
        client_id: ClientId,
        client_sequence: u64,
        source: EventSource,
    ) -> Self {
        let context = EventContext::new(client_id, client_sequence);
        Self::new(EventType::World(world_event), context, source)
    }

    pub fn system_event(
        system_event: SystemEvent,
        client_id: ClientId,
        client_sequence: u64,
    ) -> Self {
        let context = EventContext::new(client_id, client_sequence);
        Self::new(EventType::System(system_event), context, EventSource::System)
    }

    pub fn extract_world_event(&self) -> Option<&WorldEvent> {
        match &self.event {
            EventType::World(world_event) => Some(world_event),
            _ => None,
        }
    }
}

// ============================================================================
// Event Consumer Trait
// ============================================================================

/// Trait for observing events - loggers, test recorders, the CLI report
pub trait EventConsumer: Send + 'static {
    /// Handle an event envelope
    fn handle_event(&mut self, envelope: EventEnvelope);
}
