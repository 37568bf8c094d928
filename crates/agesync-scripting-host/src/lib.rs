/// Host runtime for agesync script instances
///
/// A `ScriptRunner` owns one client's `ClientWorld` and the script
/// instances attached to it, and dispatches queued world events to them.
use std::any::Any;
use std::time::Duration;

use agesync_events::{InstanceId, ObjectKey, WorldEvent};
use agesync_world::VariableDescriptor;

pub mod context;
pub mod puzzle;
pub mod registry;
pub mod relay;
pub mod script_runner;
pub mod scripts;
pub mod timer;

// Re-export commonly used types for host-side scripting
pub use agesync_world::EventFilter;
pub use context::{HostServices, ScriptContext};
pub use puzzle::{AttemptBuffer, ComboLockEngine, PuzzlePhase, PuzzleState, Transition};
pub use registry::{create_runner_from_config, create_scripts_from_config};
pub use relay::{prepare_join, relay_until_quiet, RelayStats, ReplicaPeer};
pub use script_runner::ScriptRunner;
pub use scripts::{AvatarLocation, ComboLock, SubworldGate};
pub use timer::{FiredTimer, TimerManager};

/// Trait that script instances implement
pub trait Script: Send + 'static {
    /// Unique identifier for this instance (e.g., "wellCombo")
    fn id(&self) -> &InstanceId;

    /// Human-readable name for this kind of script
    fn name(&self) -> &'static str;

    /// Description of what this script does
    fn description(&self) -> &'static str;

    /// Shared variables this script reads and writes. They are declared
    /// before `on_load`, so a join snapshot can be applied in between.
    fn declared_variables(&self) -> Vec<VariableDescriptor> {
        Vec::new()
    }

    /// Called when the script is first loaded
    fn on_load(&mut self, ctx: &mut ScriptContext<'_>);

    /// Called when the script is being unloaded
    fn on_unload(&mut self, ctx: &mut ScriptContext<'_>);

    /// Return the list of broadcast events this script wants to receive.
    /// Variable changes, timers and responder completions are always
    /// delivered to the instance that asked for them.
    fn subscribed_events(&self) -> &[EventFilter];

    /// Objects whose ownership tokens gate this script's writes
    fn governing_objects(&self) -> &[ObjectKey];

    /// Handle an event addressed to this instance
    fn on_event(&mut self, event: &WorldEvent, ctx: &mut ScriptContext<'_>);

    /// Called periodically at a fixed rate (configurable, default ~20Hz)
    fn on_tick(&mut self, _ctx: &mut ScriptContext<'_>, _delta: Duration) {}

    /// A governing object lost its holder. The default tries to take it over.
    fn on_ownership_vacated(&mut self, object: &ObjectKey, ctx: &mut ScriptContext<'_>) {
        ctx.acquire_if_vacant(object);
    }

    /// Allow downcasting to concrete script type for state access
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
