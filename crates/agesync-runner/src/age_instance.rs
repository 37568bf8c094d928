use std::collections::BTreeSet;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use agesync_events::{ClientId, EventEnvelope, EventOrigin, SdlValue, SystemEvent, WorldEvent};
use agesync_scripting_host::{prepare_join, relay_until_quiet};
use agesync_world::config::AgeConfig;
use agesync_world::SdlError;

use crate::event_bus::EventBusManager;
use crate::session::{ClientSession, SimulatedEngine};

/// Relay rounds after which a still-chattering instance is reported
const MAX_RELAY_ROUNDS: usize = 64;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("client {0} is not connected")]
    UnknownClient(ClientId),
    #[error("client {0} is already connected")]
    DuplicateClient(ClientId),
    #[error("write rejected: {0}")]
    Write(#[from] SdlError),
}

/// One world instance: every connected client and an instant relay
/// between them.
///
/// Sessions are kept in join order, which is the order every client's
/// ownership cache agrees on.
pub struct AgeInstance {
    config: AgeConfig,
    sessions: Vec<ClientSession>,
    bus: Option<EventBusManager>,
}

impl AgeInstance {
    pub fn new(config: AgeConfig) -> Self {
        Self {
            config,
            sessions: Vec::new(),
            bus: None,
        }
    }

    /// Publish every session's events to `bus`
    pub fn with_event_bus(mut self, bus: EventBusManager) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn config(&self) -> &AgeConfig {
        &self.config
    }

    /// Connected clients in join order
    pub fn members(&self) -> Vec<ClientId> {
        self.sessions.iter().map(ClientSession::client_id).collect()
    }

    pub fn sessions(&self) -> &[ClientSession] {
        &self.sessions
    }

    pub fn session(&self, client: ClientId) -> Option<&ClientSession> {
        self.sessions.iter().find(|s| s.client_id() == client)
    }

    pub fn session_mut(&mut self, client: ClientId) -> Option<&mut ClientSession> {
        self.sessions.iter_mut().find(|s| s.client_id() == client)
    }

    /// Connect a client. Everyone already present learns of it first, then
    /// the joiner loads from the earliest client's snapshot.
    pub fn join(
        &mut self,
        client_id: ClientId,
        engine: SimulatedEngine,
        now: Instant,
    ) -> Result<(), InstanceError> {
        if self.session(client_id).is_some() {
            return Err(InstanceError::DuplicateClient(client_id));
        }

        self.relay(now);
        let snapshot = prepare_join(&mut self.sessions, client_id);

        let sender = self.bus.as_ref().map(|bus| bus.create_sender(client_id));
        let session =
            ClientSession::connect(client_id, &self.config, snapshot.as_ref(), engine, sender);
        self.sessions.push(session);
        self.relay(now);

        info!(
            target: "instance",
            "{} joined {} ({} connected)",
            client_id,
            self.config.age.name,
            self.sessions.len()
        );
        Ok(())
    }

    /// Disconnect a client and hand back its engine. Tokens it held become
    /// vacant and are claimed by whoever is now earliest.
    pub fn leave(&mut self, client_id: ClientId, now: Instant) -> Result<SimulatedEngine, InstanceError> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.client_id() == client_id)
            .ok_or(InstanceError::UnknownClient(client_id))?;

        let engine = self.sessions.remove(index).disconnect();
        for session in &mut self.sessions {
            let vacated = session.observe_leave(client_id, now);
            if !vacated.is_empty() {
                debug!(target: "instance", "{} saw {} vacate {:?}", session.client_id(), client_id, vacated);
            }
        }
        self.relay(now);

        info!(
            target: "instance",
            "{} left {} ({} connected)",
            client_id,
            self.config.age.name,
            self.sessions.len()
        );
        Ok(engine)
    }

    /// Raise an engine signal on `from` and net-propagate it to everyone
    /// else. Returns whether any script on `from` received it.
    pub fn signal(&mut self, from: ClientId, event: WorldEvent, now: Instant) -> Result<bool, InstanceError> {
        if self.session(from).is_none() {
            return Err(InstanceError::UnknownClient(from));
        }

        let mut delivered = false;
        for session in &mut self.sessions {
            if session.client_id() == from {
                delivered = session.signal(event.clone(), EventOrigin::Local, now);
            } else {
                session.signal(event.clone(), EventOrigin::Remote(from), now);
            }
        }
        self.relay(now);
        Ok(delivered)
    }

    /// Write a variable as `client`. Fails unless it holds the token.
    pub fn write(
        &mut self,
        client: ClientId,
        name: &str,
        value: SdlValue,
        tag: &str,
        now: Instant,
    ) -> Result<u64, InstanceError> {
        let session = self
            .session_mut(client)
            .ok_or(InstanceError::UnknownClient(client))?;
        let sequence = session.write(name, value, tag, now)?;
        self.relay(now);
        Ok(sequence)
    }

    /// Deliver outgoing replication until every client is quiet. Returns the
    /// number of messages delivered.
    pub fn relay(&mut self, now: Instant) -> usize {
        relay_until_quiet(&mut self.sessions, now, MAX_RELAY_ROUNDS).delivered
    }

    /// Complete every playing responder on every client, including any the
    /// completions start. Returns how many were completed.
    pub fn complete_responders(&mut self, now: Instant) -> usize {
        let mut total = 0;
        for _ in 0..MAX_RELAY_ROUNDS {
            let completed: usize = self
                .sessions
                .iter_mut()
                .map(|s| s.complete_responders(now))
                .sum();
            self.relay(now);
            if completed == 0 {
                break;
            }
            total += completed;
        }
        total
    }

    pub fn tick(&mut self, now: Instant) {
        for session in &mut self.sessions {
            session.tick(now);
        }
        self.relay(now);
    }

    /// Variables whose replicas disagree between connected clients
    pub fn diverged_variables(&self) -> Vec<String> {
        let Some(first) = self.sessions.first() else {
            return Vec::new();
        };

        let names: BTreeSet<String> = self
            .sessions
            .iter()
            .flat_map(|s| s.snapshot().variables)
            .map(|update| update.name)
            .collect();

        names
            .into_iter()
            .filter(|name| {
                let expected = first.read(name);
                self.sessions.iter().any(|s| s.read(name) != expected)
            })
            .collect()
    }

    /// Disconnect everyone and tell observers the instance is gone
    pub fn shutdown(&mut self, now: Instant) {
        let members = self.members();
        for client in members.into_iter().rev() {
            let _ = self.leave(client, now);
        }
        if let Some(bus) = &self.bus {
            bus.create_sender(ClientId(0))
                .publish(EventEnvelope::system_event(SystemEvent::Shutdown, ClientId(0), 0));
        }
        info!(target: "instance", "{} shut down", self.config.age.name);
    }
}
