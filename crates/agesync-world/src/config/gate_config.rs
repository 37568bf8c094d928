use agesync_events::{ObjectKey, RegionId};
use serde::{Deserialize, Serialize};

/// A subworld entry/exit gate, e.g. a moving platform's boarding door
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub id: String,

    /// Object whose owner drives the gate variable
    pub object: ObjectKey,

    /// Bool variable that opens (true) or closes (false) the gate
    pub gate_variable: String,

    pub enter_region: RegionId,
    pub exit_region: RegionId,

    /// Subworld the avatar is attached to on entry
    pub subworld: ObjectKey,

    /// Camera pushed while inside
    #[serde(default)]
    pub camera: Option<ObjectKey>,

    /// Warp point used on exit; without one the avatar stays where it is
    #[serde(default)]
    pub exit_point: Option<ObjectKey>,

    /// Regions that block stray physics while the gate is shut
    #[serde(default)]
    pub exclusion_regions: Vec<RegionId>,

    /// How long the visible transition takes before the gate can re-arm
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

fn default_settle_ms() -> u64 {
    500
}
