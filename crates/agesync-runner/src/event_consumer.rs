use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use agesync_events::{
    EventEnvelope, EventSource, EventType, ScriptEventType, SystemEvent, WorldEvent,
};

// Re-export EventConsumer from agesync-events
pub use agesync_events::EventConsumer;

/// Event consumer that logs events to the console
#[derive(Debug, Default)]
pub struct LoggingConsumer;

impl LoggingConsumer {
    pub fn new() -> Self {
        Self
    }
}

impl EventConsumer for LoggingConsumer {
    fn handle_event(&mut self, envelope: EventEnvelope) {
        let client = envelope.context.client_id;
        match envelope.event {
            EventType::World(event) => match event {
                WorldEvent::VariableChanged {
                    name, value, tag, ..
                } if envelope.source == EventSource::Script => {
                    info!(target: "events", "[{}] COMMIT {} = {} ({})", client, name, value, tag);
                }
                other => {
                    debug!(target: "events", "[{}] {:?} via {:?}", client, other, envelope.source);
                }
            },
            EventType::System(system_event) => match system_event {
                SystemEvent::ClientJoined { client_id } => {
                    info!(target: "events", "Client joined: {}", client_id);
                }
                SystemEvent::ClientLeft { client_id } => {
                    info!(target: "events", "Client left: {}", client_id);
                }
                SystemEvent::OwnershipChanged {
                    object,
                    holder: Some(holder),
                } => {
                    info!(target: "events", "OWNERSHIP {} -> {}", object, holder);
                }
                SystemEvent::OwnershipChanged { object, holder: None } => {
                    info!(target: "events", "OWNERSHIP {} released by {}", object, client);
                }
                SystemEvent::ScriptEvent {
                    instance,
                    event_type,
                } => match event_type {
                    ScriptEventType::Loaded => {
                        debug!(target: "events", "[{}] Script loaded: {}", client, instance);
                    }
                    ScriptEventType::Unloaded => {
                        debug!(target: "events", "[{}] Script unloaded: {}", client, instance);
                    }
                    ScriptEventType::Error { message } => {
                        error!(target: "events", "[{}] Script error {}: {}", client, instance, message);
                    }
                },
                SystemEvent::Shutdown => {
                    info!(target: "events", "World instance shutting down");
                }
            },
        }
    }
}

/// Counters collected across every client of a run
#[derive(Debug, Default)]
pub struct SessionStats {
    pub joined: AtomicU32,
    pub left: AtomicU32,
    /// Variable commits made by scripts, counted once at the writer
    pub commits: AtomicU32,
    pub ownership_changes: AtomicU32,
    pub script_errors: AtomicU32,
}

impl SessionStats {
    pub fn print_final(&self, total_time: Duration) {
        info!("========================================");
        info!("Simulation complete");
        info!("Total time: {:.2}s", total_time.as_secs_f64());
        info!("========================================");
        info!("  Joined:            {}", self.joined.load(Ordering::SeqCst));
        info!("  Left:              {}", self.left.load(Ordering::SeqCst));
        info!("  Commits:           {}", self.commits.load(Ordering::SeqCst));
        info!(
            "  Ownership changes: {}",
            self.ownership_changes.load(Ordering::SeqCst)
        );
        info!(
            "  Script errors:     {}",
            self.script_errors.load(Ordering::SeqCst)
        );
        info!("========================================");
    }
}

/// Consumer that collects statistics across clients
pub struct StatsConsumer {
    stats: Arc<SessionStats>,
}

impl StatsConsumer {
    pub fn new(stats: Arc<SessionStats>) -> Self {
        Self { stats }
    }
}

impl EventConsumer for StatsConsumer {
    fn handle_event(&mut self, envelope: EventEnvelope) {
        let counter = match &envelope.event {
            EventType::World(WorldEvent::VariableChanged { .. })
                if envelope.source == EventSource::Script =>
            {
                &self.stats.commits
            }
            EventType::System(SystemEvent::ClientJoined { .. }) => &self.stats.joined,
            EventType::System(SystemEvent::ClientLeft { .. }) => &self.stats.left,
            EventType::System(SystemEvent::OwnershipChanged { .. }) => {
                &self.stats.ownership_changes
            }
            EventType::System(SystemEvent::ScriptEvent {
                event_type: ScriptEventType::Error { .. },
                ..
            }) => &self.stats.script_errors,
            _ => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Consumer that composes multiple consumers together
pub struct CompositeConsumer {
    consumers: Vec<Box<dyn EventConsumer>>,
}

impl CompositeConsumer {
    pub fn new(consumers: Vec<Box<dyn EventConsumer>>) -> Self {
        Self { consumers }
    }

    pub fn with_consumer(mut self, consumer: Box<dyn EventConsumer>) -> Self {
        self.consumers.push(consumer);
        self
    }
}

impl EventConsumer for CompositeConsumer {
    fn handle_event(&mut self, envelope: EventEnvelope) {
        for consumer in &mut self.consumers {
            consumer.handle_event(envelope.clone());
        }
    }
}

/// Drain a bus receiver into a consumer until the bus closes or a
/// `Shutdown` event arrives
pub async fn run_consumer(
    mut receiver: broadcast::Receiver<EventEnvelope>,
    mut consumer: Box<dyn EventConsumer>,
) {
    loop {
        match receiver.recv().await {
            Ok(envelope) => {
                let shutdown = matches!(envelope.event, EventType::System(SystemEvent::Shutdown));
                consumer.handle_event(envelope);
                if shutdown {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(target: "events", "Consumer lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agesync_events::{ClientId, SdlValue};

    fn commit(source: EventSource) -> EventEnvelope {
        EventEnvelope::world_event(
            WorldEvent::VariableChanged {
                name: "lockSolved".to_string(),
                value: SdlValue::bool(true),
                tag: "solved".to_string(),
                writer: ClientId(1),
            },
            ClientId(1),
            0,
            source,
        )
    }

    #[test]
    fn test_stats_count_commits_once() {
        let stats = Arc::new(SessionStats::default());
        let mut consumer = CompositeConsumer::new(vec![Box::new(LoggingConsumer::new())])
            .with_consumer(Box::new(StatsConsumer::new(stats.clone())));

        consumer.handle_event(commit(EventSource::Script));
        consumer.handle_event(commit(EventSource::Replication));
        consumer.handle_event(EventEnvelope::system_event(
            SystemEvent::ClientJoined {
                client_id: ClientId(2),
            },
            ClientId(2),
            0,
        ));

        assert_eq!(stats.commits.load(Ordering::SeqCst), 1);
        assert_eq!(stats.joined.load(Ordering::SeqCst), 1);
        assert_eq!(stats.script_errors.load(Ordering::SeqCst), 0);
    }
}
