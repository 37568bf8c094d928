use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use agesync_runner::logging::init_logging;
use agesync_runner::{
    create_event_bus_manager, run_consumer, run_simulation, CompositeConsumer, LoggingConsumer,
    SessionStats, SimulationConfig, StatsConsumer,
};
use agesync_world::config::{AgeConfig, EXAMPLE_CONFIG};

#[derive(Parser)]
#[command(name = "agesync")]
#[command(version, about = "Simulate clients sharing one world instance", long_about = None)]
pub struct Cli {
    /// Age configuration to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to the data directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write an example age configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check a configuration and list its scripts
    Check,
    /// Run simulated clients against the configured age
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Number of clients to connect
    #[arg(short, long, default_value = "3")]
    clients: u32,

    /// Random button presses spread across clients
    #[arg(short, long, default_value = "20")]
    presses: u32,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Leave puzzles as the random presses left them
    #[arg(long)]
    no_solve: bool,

    /// Skip the gate rides
    #[arg(long)]
    no_ride: bool,

    /// Disconnect the first client halfway through and reconnect it at the end
    #[arg(long)]
    churn: bool,

    /// Milliseconds per simulation step
    #[arg(long, default_value = "50")]
    tick_ms: u64,
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    fs::write(path, EXAMPLE_CONFIG).with_context(|| format!("writing {}", path.display()))?;

    info!("Created example config at {}", path.display());
    eprintln!("Config file created at: {}", path.display());
    Ok(())
}

fn load_config(path: &Path) -> Result<AgeConfig> {
    AgeConfig::load(path).with_context(|| {
        format!(
            "loading {} (run `agesync init` to create one)",
            path.display()
        )
    })
}

fn check(config: &AgeConfig) {
    println!("{}", config.age.name);
    for variable in &config.variables {
        println!("  variable {} = {} ({})", variable.name, variable.default, variable.object);
    }
    for puzzle in &config.puzzles {
        println!(
            "  puzzle {} on {}: {} button(s), {} match",
            puzzle.id,
            puzzle.object,
            puzzle.buttons.len(),
            puzzle.mode
        );
    }
    for gate in &config.gates {
        println!(
            "  gate {} on {}: {} -> {} via {}",
            gate.id, gate.object, gate.enter_region, gate.exit_region, gate.subworld
        );
    }
}

async fn simulate(config: AgeConfig, args: SimulateArgs) -> Result<()> {
    let bus = create_event_bus_manager();
    let stats = Arc::new(SessionStats::default());
    let consumer = CompositeConsumer::new(vec![
        Box::new(LoggingConsumer::new()),
        Box::new(StatsConsumer::new(stats.clone())),
    ]);
    let consumer_handle = tokio::spawn(run_consumer(bus.subscribe(), Box::new(consumer)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown_tx.send(true);
        }
    });

    let sim = SimulationConfig {
        clients: args.clients,
        random_presses: args.presses,
        seed: args.seed,
        solve: !args.no_solve,
        churn: args.churn,
        ride: !args.no_ride,
        tick_interval: Duration::from_millis(args.tick_ms),
    };

    let start_time = Instant::now();
    let report = run_simulation(config, sim, Some(bus), Some(shutdown_rx)).await?;
    if let Err(e) = consumer_handle.await {
        error!("Event consumer stopped abnormally: {}", e);
    }
    stats.print_final(start_time.elapsed());

    println!("members: {:?}", report.members);
    println!("presses: {}", report.presses);
    for (name, value) in &report.variables {
        println!("  {} = {}", name, value);
    }
    if report.interrupted {
        println!("interrupted before the run finished");
    }
    if !report.is_converged() {
        bail!("replicas diverged on {:?}", report.diverged);
    }
    println!("all replicas agree");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging("cli", cli.log_file).context("setting up logging")?;

    let path = cli.config.clone().unwrap_or_else(AgeConfig::default_path);
    match cli.command {
        Command::Init { force } => init_config(&path, force),
        Command::Check => {
            check(&load_config(&path)?);
            Ok(())
        }
        Command::Simulate(args) => {
            let config = load_config(&path)?;
            simulate(config, args).await
        }
    }
}
