use crate::ids::{ClientId, InstanceId, ObjectKey};

/// Types of script-related events
#[derive(Debug, Clone)]
pub enum ScriptEventType {
    Loaded,
    Unloaded,
    /// The instance panicked while handling a callback
    Error { message: String },
}

/// Membership and lifecycle events for a world instance
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// A client joined the world instance
    ClientJoined { client_id: ClientId },
    /// A client disconnected
    ClientLeft { client_id: ClientId },
    /// The cached holder of an ownership token changed
    OwnershipChanged {
        object: ObjectKey,
        holder: Option<ClientId>,
    },
    /// A script instance reported something
    ScriptEvent {
        instance: InstanceId,
        event_type: ScriptEventType,
    },
    /// The world instance is unloading
    Shutdown,
}
