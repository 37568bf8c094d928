use agesync_events::{ButtonId, ObjectKey, ResponderId};
use serde::{Deserialize, Serialize};

/// How a button press is scored against the solution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Press n must equal solution[n]; anything else starts over
    #[default]
    Exact,
    /// The most recent presses are compared against the solution, so a
    /// player can slide into the right sequence
    Sliding,
}

/// A combination lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuzzleConfig {
    /// Instance id, also the prefix for the puzzle's shared variables
    pub id: String,

    /// Object whose owner commits the puzzle state
    pub object: ObjectKey,

    /// Activators, in button-id order
    pub buttons: Vec<ObjectKey>,

    pub solution: Vec<ButtonId>,

    #[serde(default)]
    pub mode: MatchPolicy,

    /// Played for every press; the press only counts once it completes
    #[serde(default)]
    pub press_responder: Option<ResponderId>,

    #[serde(default)]
    pub solved_responder: Option<ResponderId>,

    /// Age-level bool mirrored from the solved state
    #[serde(default)]
    pub solved_variable: Option<String>,

    /// Ignore presses once solved instead of un-solving
    #[serde(default)]
    pub disable_on_solve: bool,
}

impl PuzzleConfig {
    pub fn solved_var(&self) -> String {
        format!("{}.solved", self.id)
    }

    pub fn correct_var(&self) -> String {
        format!("{}.numCorrect", self.id)
    }

    pub fn attempt_var(&self) -> String {
        format!("{}.attempt", self.id)
    }

    /// Button id for an activator, if it belongs to this puzzle
    pub fn button_for(&self, activator: &ObjectKey) -> Option<ButtonId> {
        self.buttons
            .iter()
            .position(|b| b == activator)
            .map(|index| index as ButtonId)
    }
}
