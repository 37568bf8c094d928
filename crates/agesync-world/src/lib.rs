/// Replicated world-instance state for agesync
///
/// Each connected client holds a `ClientWorld`: a replica of the shared
/// variables, a cache of who owns what, and the notification queue that
/// feeds its script instances.
pub mod bus;
pub mod config;
pub mod error;
pub mod ownership;
pub mod replication;
pub mod sdl;
pub mod services;
pub mod world;

pub use bus::{DedupeKey, Delivery, EventFilter, NotificationBus};
pub use error::{ConfigError, FaultKind, SdlError, ServiceError};
pub use ownership::{OwnershipArbiter, OwnershipNotice};
pub use replication::{ReplicationMessage, WorldSnapshot};
pub use sdl::{SdlStore, VariableDescriptor, VariableFlags, VariableUpdate};
pub use world::ClientWorld;
