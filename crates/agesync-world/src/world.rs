use agesync_events::{ClientId, InstanceId, ObjectKey, SdlValue};
use tracing::debug;

use crate::bus::NotificationBus;
use crate::error::SdlError;
use crate::ownership::OwnershipArbiter;
use crate::replication::{ReplicationMessage, WorldSnapshot};
use crate::sdl::{SdlStore, VariableDescriptor};
use crate::services::ChronicleStore;

/// One client's view of a world instance: its variable replica, its
/// ownership cache and the queue feeding its script instances.
#[derive(Debug)]
pub struct ClientWorld {
    pub client_id: ClientId,
    pub sdl: SdlStore,
    pub ownership: OwnershipArbiter,
    pub bus: NotificationBus,
}

impl ClientWorld {
    pub fn new(client_id: ClientId) -> Self {
        Self {
            client_id,
            sdl: SdlStore::new(client_id),
            ownership: OwnershipArbiter::new(client_id),
            bus: NotificationBus::new(),
        }
    }

    pub fn declare(&mut self, descriptor: VariableDescriptor, chronicle: Option<&dyn ChronicleStore>) {
        self.sdl.declare(descriptor, chronicle);
    }

    pub fn read(&self, name: &str) -> Option<&SdlValue> {
        self.sdl.read(name)
    }

    /// Gated by the ownership token of the variable's governing object
    pub fn write(&mut self, name: &str, value: SdlValue, tag: &str) -> Result<u64, SdlError> {
        self.sdl
            .write(name, value, tag, &self.ownership, &mut self.bus)
    }

    pub fn subscribe(&mut self, name: &str, instance: &InstanceId) -> Result<bool, SdlError> {
        self.sdl.subscribe(name, instance)
    }

    pub fn is_owner(&self, object: &ObjectKey) -> bool {
        self.ownership.is_owner(object)
    }

    pub fn acquire_if_vacant(&mut self, object: &ObjectKey) -> bool {
        self.ownership.acquire_if_vacant(object)
    }

    /// Apply a message relayed from another client
    pub fn apply(&mut self, message: &ReplicationMessage) {
        match message {
            ReplicationMessage::Variable(update) => {
                self.sdl.apply_remote(update, &mut self.bus);
            }
            ReplicationMessage::Ownership(notice) => {
                self.ownership.apply_notice(notice);
            }
        }
    }

    /// Ownership notices first, so receivers know the writer before its writes
    pub fn take_outgoing(&mut self) -> Vec<ReplicationMessage> {
        let mut messages: Vec<ReplicationMessage> = self
            .ownership
            .take_outbox()
            .into_iter()
            .map(ReplicationMessage::Ownership)
            .collect();
        messages.extend(
            self.sdl
                .take_outbox()
                .into_iter()
                .map(ReplicationMessage::Variable),
        );
        messages
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            members: self.ownership.members().to_vec(),
            holders: self.ownership.holders(),
            variables: self.sdl.snapshot(),
        }
    }

    /// Adopt membership and tokens from a snapshot. Variable values are
    /// applied separately once scripts have declared them.
    pub fn load_membership(&mut self, snapshot: &WorldSnapshot) {
        debug!(
            target: "replication",
            "{} joining with {} members, {} tokens",
            self.client_id,
            snapshot.members.len(),
            snapshot.holders.len()
        );
        self.ownership
            .load_snapshot(&snapshot.members, &snapshot.holders);
    }

    /// Apply snapshot values for every variable declared so far
    pub fn load_variables(&mut self, snapshot: &WorldSnapshot) -> usize {
        let mut applied = 0;
        for update in &snapshot.variables {
            if self.sdl.is_declared(&update.name) && self.sdl.apply_remote(update, &mut self.bus) {
                applied += 1;
            }
        }
        applied
    }
}
