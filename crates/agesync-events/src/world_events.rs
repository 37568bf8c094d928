use serde::{Deserialize, Serialize};

use crate::ids::{AvatarId, ClientId, ObjectKey, RegionId, ResponderId, TimerId};
use crate::values::SdlValue;

/// Events delivered to script instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// An avatar entered a region sensor
    RegionEnter { region: RegionId, avatar: AvatarId },
    /// An avatar left a region sensor
    RegionExit { region: RegionId, avatar: AvatarId },
    /// An activator was clicked
    Picked {
        activator: ObjectKey,
        avatar: AvatarId,
    },
    /// A timer scheduled by the receiving instance expired
    TimerFired { timer: TimerId, name: String },
    /// A multistage behavior advanced to a new stage
    MultiStageStep {
        behavior: ObjectKey,
        stage: u32,
        avatar: AvatarId,
    },
    /// A shared variable the receiver subscribed to was committed
    VariableChanged {
        name: String,
        value: SdlValue,
        tag: String,
        writer: ClientId,
    },
    /// A responder started through the gateway finished
    ResponderCompleted { responder: ResponderId, ticket: u64 },
}

/// Coarse event category used for subscription and FIFO bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Topic {
    Region,
    Pick,
    Timer,
    MultiStage,
    Variable,
    Responder,
}

impl WorldEvent {
    pub fn topic(&self) -> Topic {
        match self {
            WorldEvent::RegionEnter { .. } | WorldEvent::RegionExit { .. } => Topic::Region,
            WorldEvent::Picked { .. } => Topic::Pick,
            WorldEvent::TimerFired { .. } => Topic::Timer,
            WorldEvent::MultiStageStep { .. } => Topic::MultiStage,
            WorldEvent::VariableChanged { .. } => Topic::Variable,
            WorldEvent::ResponderCompleted { .. } => Topic::Responder,
        }
    }

    /// The avatar that caused this event, if any
    pub fn avatar(&self) -> Option<AvatarId> {
        match self {
            WorldEvent::RegionEnter { avatar, .. }
            | WorldEvent::RegionExit { avatar, .. }
            | WorldEvent::Picked { avatar, .. }
            | WorldEvent::MultiStageStep { avatar, .. } => Some(*avatar),
            _ => None,
        }
    }

    /// Engine-originated events can be re-fired by the engine and are
    /// candidates for deduplication. Internal events never are.
    pub fn is_raw_engine_signal(&self) -> bool {
        matches!(
            self,
            WorldEvent::RegionEnter { .. }
                | WorldEvent::RegionExit { .. }
                | WorldEvent::Picked { .. }
                | WorldEvent::MultiStageStep { .. }
        )
    }
}
