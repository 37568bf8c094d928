#![allow(dead_code)]

use std::time::Instant;

use agesync_events::{AvatarId, ClientId, EventOrigin, ObjectKey, RegionId, SdlValue, WorldEvent};
use agesync_scripting_host::{
    create_runner_from_config, prepare_join, relay_until_quiet, HostServices, ReplicaPeer, ScriptRunner,
};
use agesync_world::config::AgeConfig;
use agesync_world::services::{MemoryChronicle, RecordingAvatar, RecordingResponders};
use agesync_world::ReplicationMessage;

/// One simulated client with recording collaborators
pub struct Client {
    pub runner: ScriptRunner,
    pub responders: RecordingResponders,
    pub avatar: RecordingAvatar,
    pub chronicle: MemoryChronicle,
}

impl Client {
    pub fn id(&self) -> ClientId {
        self.runner.client_id()
    }

    pub fn with_services<R>(&mut self, f: impl FnOnce(&mut ScriptRunner, &mut HostServices<'_>) -> R) -> R {
        let mut services = HostServices::new(&mut self.responders, &mut self.avatar, &mut self.chronicle);
        f(&mut self.runner, &mut services)
    }

    pub fn read_bool(&self, name: &str) -> Option<bool> {
        self.runner.world().read(name).and_then(SdlValue::first_bool)
    }

    pub fn read_int(&self, name: &str) -> Option<i64> {
        self.runner.world().read(name).and_then(SdlValue::first_int)
    }

    /// Commit a write as this client and deliver the resulting notifications
    pub fn write(&mut self, name: &str, value: SdlValue, now: Instant) {
        self.runner
            .world_mut()
            .write(name, value, "test")
            .expect("write");
        self.with_services(|runner, services| runner.process_pending(services, now));
    }

    pub fn signal(&mut self, event: WorldEvent, origin: EventOrigin, now: Instant) -> bool {
        self.with_services(|runner, services| runner.handle_event(event, origin, services, now))
    }

    pub fn tick(&mut self, now: Instant) {
        self.with_services(|runner, services| runner.tick(now, services));
    }
}

impl ReplicaPeer for Client {
    fn peer_id(&self) -> ClientId {
        self.id()
    }

    fn runner(&self) -> &ScriptRunner {
        &self.runner
    }

    fn take_outgoing(&mut self) -> Vec<ReplicationMessage> {
        self.runner.take_outgoing()
    }

    fn apply(&mut self, message: &ReplicationMessage, now: Instant) {
        self.with_services(|runner, services| runner.apply_replication(message, services, now));
    }

    fn observe_join(&mut self, client: ClientId) {
        self.runner.observe_join(client);
    }
}

/// Clients of one world instance with an instant relay between them
pub struct Cluster {
    pub config: AgeConfig,
    pub clients: Vec<Client>,
    pub now: Instant,
}

/// Route script logs to the test harness; `RUST_LOG=debug` shows them
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl Cluster {
    pub fn new(config: AgeConfig) -> Self {
        init_tracing();
        Self {
            config,
            clients: Vec::new(),
            now: Instant::now(),
        }
    }

    pub fn from_toml(toml: &str) -> Self {
        Self::new(AgeConfig::from_toml_str(toml).expect("config"))
    }

    /// Connect a client; later clients receive a snapshot from the first
    pub fn join(&mut self, id: u32) -> usize {
        self.join_with(id, RecordingResponders::new(), RecordingAvatar::new())
    }

    pub fn join_with(&mut self, id: u32, mut responders: RecordingResponders, mut avatar: RecordingAvatar) -> usize {
        let client_id = ClientId(id);
        let snapshot = prepare_join(&mut self.clients, client_id);

        let mut chronicle = MemoryChronicle::default();
        let runner = {
            let mut services = HostServices::new(&mut responders, &mut avatar, &mut chronicle);
            create_runner_from_config(client_id, &self.config, snapshot.as_ref(), &mut services)
        };
        self.clients.push(Client {
            runner,
            responders,
            avatar,
            chronicle,
        });
        self.relay();
        self.clients.len() - 1
    }

    pub fn leave(&mut self, index: usize) -> Client {
        let gone = self.clients.remove(index);
        let now = self.now;
        for client in &mut self.clients {
            client.with_services(|runner, services| runner.observe_leave(gone.id(), services, now));
        }
        self.relay();
        gone
    }

    /// Deliver outgoing replication until every client is quiet
    pub fn relay(&mut self) {
        let stats = relay_until_quiet(&mut self.clients, self.now, 64);
        assert!(stats.quiet, "replication did not settle");
    }

    /// Raise an engine signal on one client and net-propagate it to the rest
    pub fn broadcast(&mut self, from: usize, event: WorldEvent) {
        let now = self.now;
        let origin_id = self.clients[from].id();
        for (index, client) in self.clients.iter_mut().enumerate() {
            let origin = if index == from {
                EventOrigin::Local
            } else {
                EventOrigin::Remote(origin_id)
            };
            client.signal(event.clone(), origin, now);
        }
        self.relay();
    }

    pub fn pick(&mut self, from: usize, activator: &str) {
        let avatar = AvatarId(self.clients[from].id().0);
        self.broadcast(
            from,
            WorldEvent::Picked {
                activator: ObjectKey::new(activator),
                avatar,
            },
        );
    }

    /// Complete every responder run still playing, on every client
    pub fn finish_responders(&mut self) {
        let now = self.now;
        loop {
            let mut any = false;
            for client in &mut self.clients {
                for (ticket, _) in client.responders.take_pending() {
                    any = true;
                    client.with_services(|runner, services| runner.complete_responder(ticket, services, now));
                }
            }
            self.relay();
            if !any {
                break;
            }
        }
    }

    pub fn region_enter(&mut self, client: usize, region: &str, avatar: u32) -> bool {
        let now = self.now;
        let delivered = self.clients[client].signal(
            WorldEvent::RegionEnter {
                region: RegionId::new(region),
                avatar: AvatarId(avatar),
            },
            EventOrigin::Local,
            now,
        );
        self.relay();
        delivered
    }

    pub fn write(&mut self, client: usize, name: &str, value: SdlValue) {
        let now = self.now;
        self.clients[client].write(name, value, now);
        self.relay();
    }

    pub fn advance(&mut self, by: std::time::Duration) {
        self.now += by;
        let now = self.now;
        for client in &mut self.clients {
            client.tick(now);
        }
        self.relay();
    }
}
