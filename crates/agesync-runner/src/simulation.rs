use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use agesync_events::{AvatarId, ClientId, ObjectKey, SdlValue, WorldEvent};
use agesync_world::config::{AgeConfig, GateConfig};

use crate::age_instance::{AgeInstance, InstanceError};
use crate::event_bus::EventBusManager;
use crate::session::SimulatedEngine;

/// Shape of a simulated play session
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Clients that join, one per step, in id order starting at 1
    pub clients: u32,
    /// Random button presses spread across clients
    pub random_presses: u32,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
    /// Enter every puzzle's solution after the random presses
    pub solve: bool,
    /// Disconnect the earliest client halfway through and reconnect it later
    pub churn: bool,
    /// Open every gate and send each avatar through it
    pub ride: bool,
    /// Simulated time per step; the loop also paces itself at this rate
    pub tick_interval: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            clients: 3,
            random_presses: 20,
            seed: None,
            solve: true,
            churn: false,
            ride: true,
            tick_interval: Duration::from_millis(50),
        }
    }
}

/// What every client agreed on when the run ended
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub members: Vec<ClientId>,
    /// The earliest client's view of every replicated variable
    pub variables: Vec<(String, SdlValue)>,
    /// Variables whose replicas disagree; empty on a healthy run
    pub diverged: Vec<String>,
    pub presses: u32,
    pub interrupted: bool,
}

impl SimulationReport {
    pub fn is_converged(&self) -> bool {
        self.diverged.is_empty()
    }
}

/// A scheduled action in the run
#[derive(Debug, Clone)]
enum Step {
    Join(ClientId),
    Leave(ClientId),
    Press { puzzle: usize, button: usize },
    Solve(usize),
    OpenGate(usize),
    Ride { gate: usize, client: ClientId },
}

/// Drive one world instance through joins, presses, rides and churn
pub async fn run_simulation(
    age: AgeConfig,
    sim: SimulationConfig,
    bus: Option<EventBusManager>,
    mut shutdown_rx: Option<watch::Receiver<bool>>,
) -> Result<SimulationReport, InstanceError> {
    let mut rng = match sim.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let steps = plan(&age, &sim, &mut rng);
    info!(
        target: "simulation",
        "Simulating {} with {} client(s), {} step(s)",
        age.age.name,
        sim.clients,
        steps.len()
    );

    let mut instance = AgeInstance::new(age);
    if let Some(bus) = bus {
        instance = instance.with_event_bus(bus);
    }

    let mut now = Instant::now();
    let mut interval = tokio::time::interval(sim.tick_interval.max(Duration::from_millis(1)));
    let mut presses = 0;
    let mut interrupted = false;

    for step in steps {
        tokio::select! {
            _ = interval.tick() => {}
            _ = async {
                if let Some(rx) = shutdown_rx.as_mut() {
                    if rx.changed().await.is_ok() {
                        return;
                    }
                }
                // No sender left, so nobody can ask us to stop
                std::future::pending::<()>().await
            } => {
                info!(target: "simulation", "Simulation received shutdown signal");
                interrupted = true;
                break;
            }
        }

        debug!(target: "simulation", "Step {:?}", step);
        match step {
            Step::Join(client) => instance.join(client, SimulatedEngine::new(), now)?,
            Step::Leave(client) => {
                instance.leave(client, now)?;
            }
            Step::Press { puzzle, button } => {
                if press(&mut instance, &mut rng, puzzle, button, now)? {
                    presses += 1;
                }
            }
            Step::Solve(puzzle) => presses += solve(&mut instance, &mut rng, puzzle, now)?,
            Step::OpenGate(gate) => open_gate(&mut instance, gate, now)?,
            Step::Ride { gate, client } => {
                let config = instance.config().gates[gate].clone();
                if instance.session(client).is_none() {
                    continue;
                }
                let settle = Duration::from_millis(config.settle_ms);

                instance.signal(client, region_enter(&config, client, true), now)?;
                now += settle;
                instance.tick(now);

                // A gate arms one transition per open signal
                open_gate(&mut instance, gate, now)?;
                instance.signal(client, region_enter(&config, client, false), now)?;
                now += settle;
                instance.tick(now);
            }
        }

        instance.complete_responders(now);
        now += sim.tick_interval;
        instance.tick(now);
    }

    let report = SimulationReport {
        members: instance.members(),
        variables: instance
            .sessions()
            .first()
            .map(|s| {
                s.snapshot()
                    .variables
                    .into_iter()
                    .map(|u| (u.name, u.value))
                    .collect()
            })
            .unwrap_or_default(),
        diverged: instance.diverged_variables(),
        presses,
        interrupted,
    };

    if !report.is_converged() {
        warn!(target: "simulation", "Replicas diverged on {:?}", report.diverged);
    }
    instance.shutdown(now);
    Ok(report)
}

fn plan(age: &AgeConfig, sim: &SimulationConfig, rng: &mut StdRng) -> Vec<Step> {
    let mut steps: Vec<Step> = (1..=sim.clients).map(|id| Step::Join(ClientId(id))).collect();

    let mut random = Vec::new();
    if !age.puzzles.is_empty() {
        for _ in 0..sim.random_presses {
            let puzzle = rng.gen_range(0..age.puzzles.len());
            let button = rng.gen_range(0..age.puzzles[puzzle].buttons.len());
            random.push(Step::Press { puzzle, button });
        }
    }

    let half = random.len() / 2;
    let rest = random.split_off(half);
    steps.extend(random);
    if sim.churn && sim.clients > 1 {
        steps.push(Step::Leave(ClientId(1)));
    }
    steps.extend(rest);

    if sim.solve {
        steps.extend((0..age.puzzles.len()).map(Step::Solve));
    }

    if sim.ride {
        for gate in 0..age.gates.len() {
            steps.push(Step::OpenGate(gate));
            let mut riders: Vec<ClientId> = (1..=sim.clients).map(ClientId).collect();
            if sim.churn && sim.clients > 1 {
                riders.retain(|c| *c != ClientId(1));
            }
            riders.shuffle(rng);
            steps.extend(riders.into_iter().map(|client| Step::Ride { gate, client }));
        }
    }

    if sim.churn && sim.clients > 1 {
        steps.push(Step::Join(ClientId(1)));
    }
    steps
}

/// Press a button as a random connected client. The button index is
/// clamped to the puzzle's activators.
fn press(
    instance: &mut AgeInstance,
    rng: &mut StdRng,
    puzzle: usize,
    button: usize,
    now: Instant,
) -> Result<bool, InstanceError> {
    let members = instance.members();
    let Some(&client) = members.choose(rng) else {
        return Ok(false);
    };
    let buttons = &instance.config().puzzles[puzzle].buttons;
    let Some(activator) = buttons.get(button.min(buttons.len().saturating_sub(1))).cloned() else {
        return Ok(false);
    };

    instance.signal(
        client,
        WorldEvent::Picked {
            activator,
            avatar: AvatarId(client.0),
        },
        now,
    )?;
    // Let the press animation finish before the next one
    instance.complete_responders(now);
    Ok(true)
}

/// Press the next correct button until the replicated state reads solved.
/// Returns the number of presses it took.
fn solve(
    instance: &mut AgeInstance,
    rng: &mut StdRng,
    puzzle: usize,
    now: Instant,
) -> Result<u32, InstanceError> {
    let config = instance.config().puzzles[puzzle].clone();
    let mut presses = 0;

    for _ in 0..=config.solution.len() * 2 {
        let Some(observer) = instance.sessions().first() else {
            break;
        };
        if observer.read(&config.solved_var()).and_then(SdlValue::first_bool) == Some(true) {
            info!(target: "simulation", "{} solved after {} press(es)", config.id, presses);
            return Ok(presses);
        }
        let progress = observer
            .read(&config.correct_var())
            .and_then(SdlValue::first_int)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        let Some(&button) = config.solution.get(progress) else {
            break;
        };
        if press(instance, rng, puzzle, button as usize, now)? {
            presses += 1;
        }
    }

    warn!(target: "simulation", "{} still unsolved after {} press(es)", config.id, presses);
    Ok(presses)
}

/// Open a gate as whichever client holds its object
fn open_gate(instance: &mut AgeInstance, gate: usize, now: Instant) -> Result<(), InstanceError> {
    let config = instance.config().gates[gate].clone();
    let Some(owner) = owner_of(instance, &config.object) else {
        warn!(target: "simulation", "Nobody holds {}, gate {} stays shut", config.object, config.id);
        return Ok(());
    };
    instance.write(owner, &config.gate_variable, SdlValue::bool(true), "open", now)?;
    Ok(())
}

fn region_enter(gate: &GateConfig, client: ClientId, entering: bool) -> WorldEvent {
    let region = if entering {
        gate.enter_region.clone()
    } else {
        gate.exit_region.clone()
    };
    WorldEvent::RegionEnter {
        region,
        avatar: AvatarId(client.0),
    }
}

fn owner_of(instance: &AgeInstance, object: &ObjectKey) -> Option<ClientId> {
    instance
        .sessions()
        .iter()
        .find(|s| s.runner().world().is_owner(object))
        .map(|s| s.client_id())
}
