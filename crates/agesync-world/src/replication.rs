use agesync_events::{ClientId, ObjectKey};
use serde::{Deserialize, Serialize};

use crate::ownership::OwnershipNotice;
use crate::sdl::VariableUpdate;

/// What one client sends the others through the relay. Delivery is
/// at-least-once and ordered per variable; receivers tolerate repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    Variable(VariableUpdate),
    Ownership(OwnershipNotice),
}

/// State handed to a client as it joins a populated world instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Connected clients in join order, the joiner last
    pub members: Vec<ClientId>,
    pub holders: Vec<(ObjectKey, ClientId)>,
    pub variables: Vec<VariableUpdate>,
}
