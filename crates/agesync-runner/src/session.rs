use std::time::Instant;

use agesync_events::{
    ClientId, EventContext, EventEnvelope, EventOrigin, EventSource, EventType, InstanceId,
    ObjectKey, ScriptEventType, SdlValue, SystemEvent, WorldEvent,
};
use agesync_scripting_host::{create_runner_from_config, HostServices, ReplicaPeer, ScriptRunner};
use agesync_world::config::AgeConfig;
use agesync_world::services::{MemoryChronicle, RecordingAvatar, RecordingResponders};
use agesync_world::{OwnershipNotice, ReplicationMessage, SdlError, WorldSnapshot};
use tracing::{debug, info};

use crate::event_bus::EventSender;

/// In-memory stand-ins for one client's engine: responders, avatar control
/// and the player's chronicle
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    pub responders: RecordingResponders,
    pub avatar: RecordingAvatar,
    pub chronicle: MemoryChronicle,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chronicle(mut self, chronicle: MemoryChronicle) -> Self {
        self.chronicle = chronicle;
        self
    }

    pub fn with_avatar(mut self, avatar: RecordingAvatar) -> Self {
        self.avatar = avatar;
        self
    }

    pub fn with_responders(mut self, responders: RecordingResponders) -> Self {
        self.responders = responders;
        self
    }
}

/// One connected client: its scripts, its world replica and its engine
pub struct ClientSession {
    client_id: ClientId,
    runner: ScriptRunner,
    engine: SimulatedEngine,
    sender: Option<EventSender>,
    sequence: u64,
}

impl ClientSession {
    /// Load the age's scripts for a client. A joining client passes the
    /// snapshot it received from the instance.
    pub fn connect(
        client_id: ClientId,
        config: &AgeConfig,
        snapshot: Option<&WorldSnapshot>,
        mut engine: SimulatedEngine,
        sender: Option<EventSender>,
    ) -> Self {
        let runner = {
            let mut services = HostServices::new(
                &mut engine.responders,
                &mut engine.avatar,
                &mut engine.chronicle,
            );
            create_runner_from_config(client_id, config, snapshot, &mut services)
        };

        let mut session = Self {
            client_id,
            runner,
            engine,
            sender,
            sequence: 0,
        };

        session.emit_system(SystemEvent::ClientJoined { client_id });
        let loaded: Vec<InstanceId> = session
            .runner
            .script_ids()
            .into_iter()
            .map(InstanceId::from)
            .collect();
        for instance in loaded {
            session.emit_system(SystemEvent::ScriptEvent {
                instance,
                event_type: ScriptEventType::Loaded,
            });
        }
        session.report_faults();

        info!(
            target: "session",
            "{} connected with {} script(s)",
            client_id,
            session.runner.script_count()
        );
        session
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    pub fn engine(&self) -> &SimulatedEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SimulatedEngine {
        &mut self.engine
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.runner.world().snapshot()
    }

    /// Raise an engine signal on this client
    pub fn signal(&mut self, event: WorldEvent, origin: EventOrigin, now: Instant) -> bool {
        if origin == EventOrigin::Local {
            self.emit(EventType::World(event.clone()), EventSource::Engine, origin);
        }
        let mut services = HostServices::new(
            &mut self.engine.responders,
            &mut self.engine.avatar,
            &mut self.engine.chronicle,
        );
        let delivered = self.runner.handle_event(event, origin, &mut services, now);
        self.report_faults();
        delivered
    }

    /// Commit a write directly, as a console command or debug tool would
    pub fn write(
        &mut self,
        name: &str,
        value: SdlValue,
        tag: &str,
        now: Instant,
    ) -> Result<u64, SdlError> {
        let sequence = self.runner.world_mut().write(name, value, tag)?;
        let mut services = HostServices::new(
            &mut self.engine.responders,
            &mut self.engine.avatar,
            &mut self.engine.chronicle,
        );
        self.runner.process_pending(&mut services, now);
        self.report_faults();
        Ok(sequence)
    }

    pub fn read(&self, name: &str) -> Option<&SdlValue> {
        self.runner.world().read(name)
    }

    /// Apply a message another client sent
    pub fn apply(&mut self, message: &ReplicationMessage, now: Instant) {
        let mut services = HostServices::new(
            &mut self.engine.responders,
            &mut self.engine.avatar,
            &mut self.engine.chronicle,
        );
        self.runner.apply_replication(message, &mut services, now);
        self.report_faults();
    }

    /// Messages for the other clients. Each is also announced to observers
    /// once, by the client that produced it.
    pub fn take_outgoing(&mut self) -> Vec<ReplicationMessage> {
        let outgoing = self.runner.take_outgoing();
        for message in &outgoing {
            match message {
                ReplicationMessage::Ownership(OwnershipNotice::Claimed { object, client }) => {
                    self.emit_system(SystemEvent::OwnershipChanged {
                        object: object.clone(),
                        holder: Some(*client),
                    });
                }
                ReplicationMessage::Ownership(OwnershipNotice::Released { object, .. }) => {
                    self.emit_system(SystemEvent::OwnershipChanged {
                        object: object.clone(),
                        holder: None,
                    });
                }
                ReplicationMessage::Variable(update) => {
                    self.emit(
                        EventType::World(WorldEvent::VariableChanged {
                            name: update.name.clone(),
                            value: update.value.clone(),
                            tag: update.tag.clone(),
                            writer: update.writer,
                        }),
                        EventSource::Script,
                        EventOrigin::Local,
                    );
                }
            }
        }
        outgoing
    }

    pub fn observe_join(&mut self, client: ClientId) {
        self.runner.observe_join(client);
    }

    pub fn observe_leave(&mut self, client: ClientId, now: Instant) -> Vec<ObjectKey> {
        let mut services = HostServices::new(
            &mut self.engine.responders,
            &mut self.engine.avatar,
            &mut self.engine.chronicle,
        );
        let vacated = self.runner.observe_leave(client, &mut services, now);
        self.report_faults();
        vacated
    }

    /// Finish every responder this client has playing. Returns how many.
    pub fn complete_responders(&mut self, now: Instant) -> usize {
        let pending = self.engine.responders.take_pending();
        let count = pending.len();
        for (ticket, request) in pending {
            debug!(target: "session", "{} finished {} (ticket {})", self.client_id, request.responder, ticket);
            let mut services = HostServices::new(
                &mut self.engine.responders,
                &mut self.engine.avatar,
                &mut self.engine.chronicle,
            );
            self.runner.complete_responder(ticket, &mut services, now);
        }
        self.report_faults();
        count
    }

    pub fn tick(&mut self, now: Instant) {
        let mut services = HostServices::new(
            &mut self.engine.responders,
            &mut self.engine.avatar,
            &mut self.engine.chronicle,
        );
        self.runner.tick(now, &mut services);
        self.report_faults();
    }

    /// Unload scripts and hand back the engine, chronicle included
    pub fn disconnect(mut self) -> SimulatedEngine {
        let ids: Vec<InstanceId> = self
            .runner
            .script_ids()
            .into_iter()
            .map(InstanceId::from)
            .collect();
        {
            let mut services = HostServices::new(
                &mut self.engine.responders,
                &mut self.engine.avatar,
                &mut self.engine.chronicle,
            );
            self.runner.unload_scripts(&mut services);
        }
        for id in ids {
            self.emit_system(SystemEvent::ScriptEvent {
                instance: id,
                event_type: ScriptEventType::Unloaded,
            });
        }
        self.emit_system(SystemEvent::ClientLeft {
            client_id: self.client_id,
        });
        info!(target: "session", "{} disconnected", self.client_id);
        self.engine
    }

    fn report_faults(&mut self) {
        for (instance, message) in self.runner.take_faults() {
            self.emit_system(SystemEvent::ScriptEvent {
                instance,
                event_type: ScriptEventType::Error { message },
            });
        }
    }

    fn emit_system(&mut self, event: SystemEvent) {
        self.emit(EventType::System(event), EventSource::System, EventOrigin::Local);
    }

    fn emit(&mut self, event: EventType, source: EventSource, origin: EventOrigin) {
        let Some(sender) = &self.sender else {
            return;
        };
        let context = EventContext::new(self.client_id, self.sequence).with_origin(origin);
        sender.publish(EventEnvelope::new(event, context, source));
        self.sequence += 1;
    }
}

impl ReplicaPeer for ClientSession {
    fn peer_id(&self) -> ClientId {
        self.client_id
    }

    fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    fn take_outgoing(&mut self) -> Vec<ReplicationMessage> {
        ClientSession::take_outgoing(self)
    }

    fn apply(&mut self, message: &ReplicationMessage, now: Instant) {
        ClientSession::apply(self, message, now)
    }

    fn observe_join(&mut self, client: ClientId) {
        ClientSession::observe_join(self, client)
    }
}
