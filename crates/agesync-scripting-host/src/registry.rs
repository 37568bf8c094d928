use std::time::Duration;

use agesync_events::ClientId;
use agesync_world::config::AgeConfig;
use agesync_world::WorldSnapshot;
use tracing::debug;

use super::context::HostServices;
use super::script_runner::ScriptRunner;
use super::scripts::{ComboLock, SubworldGate};
use super::Script;

/// Build one script instance per configured puzzle and gate
pub fn create_scripts_from_config(config: &AgeConfig) -> Vec<Box<dyn Script>> {
    let mut scripts: Vec<Box<dyn Script>> = Vec::new();
    for puzzle in &config.puzzles {
        scripts.push(Box::new(ComboLock::new(puzzle.clone())));
    }
    for gate in &config.gates {
        scripts.push(Box::new(SubworldGate::new(gate.clone())));
    }
    scripts
}

/// Create a script runner from config.
///
/// A joining client passes the snapshot it received: membership and tokens
/// are adopted before any script can claim an object, and variable values
/// are in place before `on_load` reads them.
pub fn create_runner_from_config(
    client_id: ClientId,
    config: &AgeConfig,
    snapshot: Option<&WorldSnapshot>,
    services: &mut HostServices<'_>,
) -> ScriptRunner {
    debug!(target: "scripting", "Creating script runner for {} in {}", client_id, config.age.name);
    let mut runner = ScriptRunner::new_with_tick_rate(
        client_id,
        Duration::from_millis(config.age.tick_interval_ms),
    );

    let scripts = create_scripts_from_config(config);

    {
        let world = runner.world_mut();
        if let Some(snapshot) = snapshot {
            world.load_membership(snapshot);
        }
        for variable in &config.variables {
            world.declare(variable.descriptor(), Some(&*services.chronicle));
        }
        for script in &scripts {
            for descriptor in script.declared_variables() {
                world.declare(descriptor, Some(&*services.chronicle));
            }
        }
        if let Some(snapshot) = snapshot {
            world.load_variables(snapshot);
        }
    }

    for script in scripts {
        runner.register_script(script, services);
    }

    runner
}
