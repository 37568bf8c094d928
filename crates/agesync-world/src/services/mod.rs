//! Narrow interfaces to the engine-side collaborators.
//!
//! Responders, chronicle storage and avatar/camera control are opaque
//! side-effecting services; scripts only ever talk to them through these
//! traits.
use agesync_events::{AvatarId, ButtonId, ObjectKey, RegionId, ResponderId};

use crate::error::ServiceError;

pub mod memory;

pub use memory::{AvatarCall, MemoryChronicle, RecordingAvatar, RecordingResponders};

/// Parameters passed along with a responder run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponderParams {
    /// Jump to the end state without playing the sequence
    pub fast_forward: bool,
    /// Named responder state to run, if the responder has several
    pub state: Option<String>,
    pub avatar: Option<AvatarId>,
    pub button: Option<ButtonId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponderRequest {
    pub responder: ResponderId,
    pub params: ResponderParams,
    /// Play the sequence on every client, not just this one
    pub net_propagate: bool,
}

/// Fire-and-forget presentation sequences.
///
/// Every successful `run` must eventually produce exactly one
/// `ResponderCompleted` carrying the returned ticket.
pub trait ResponderGateway {
    fn run(&mut self, request: ResponderRequest) -> Result<u64, ServiceError>;
}

/// Slow, occasionally-absent key/value storage used to seed defaults
pub trait ChronicleStore {
    fn read_entry(&self, name: &str) -> Option<String>;
    fn write_entry(&mut self, name: &str, value: String);
}

/// Avatar, physics and camera control. Failures are reported synchronously.
pub trait AvatarServices {
    fn enter_subworld(&mut self, avatar: AvatarId, subworld: &ObjectKey) -> Result<(), ServiceError>;
    fn exit_subworld(&mut self, avatar: AvatarId) -> Result<(), ServiceError>;
    fn warp(&mut self, avatar: AvatarId, target: &ObjectKey) -> Result<(), ServiceError>;
    fn push_camera(&mut self, avatar: AvatarId, camera: &ObjectKey) -> Result<(), ServiceError>;
    fn pop_camera(&mut self, avatar: AvatarId, camera: &ObjectKey) -> Result<(), ServiceError>;
    /// Turn a region sensor on or off
    fn set_region_enabled(&mut self, region: &RegionId, enabled: bool) -> Result<(), ServiceError>;
    /// Remove a physics exclusion region so avatars can pass again
    fn clear_exclusion(&mut self, region: &RegionId) -> Result<(), ServiceError>;
}
