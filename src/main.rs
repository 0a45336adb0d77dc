use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use aurora_traffic::simulation::{GridConfig, SimConfig, SimWorld, Strategy};

#[derive(Parser)]
#[command(name = "aurora_traffic")]
#[command(about = "Headless multi-agent traffic simulation with adaptive orchestration")]
struct Cli {
    /// Grid rows
    #[arg(long, default_value = "3")]
    rows: usize,

    /// Grid columns
    #[arg(long, default_value = "3")]
    cols: usize,

    /// Constant agent population
    #[arg(long, default_value = "40")]
    agents: usize,

    /// Number of simulation ticks to run
    #[arg(long, default_value = "1000")]
    ticks: u32,

    /// Time delta per tick in seconds (clamped to the max step)
    #[arg(long, default_value_t = 1.0 / 60.0)]
    delta: f32,

    /// Orchestration strategy to start with
    #[arg(long, value_enum, default_value_t = Strategy::Default)]
    strategy: Strategy,

    /// Strategy to switch to mid-run
    #[arg(long, value_enum)]
    switch_to: Option<Strategy>,

    /// Tick at which to switch strategy
    #[arg(long, default_value = "500")]
    switch_at: u32,

    /// Seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,

    /// Populate with riders instead of plain vehicles
    #[arg(long)]
    riders: bool,

    /// Number of hazards riders react to
    #[arg(long, default_value = "0")]
    hazards: usize,

    /// Print the final statistics as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = SimConfig {
        grid: GridConfig {
            rows: cli.rows,
            cols: cli.cols,
            ..GridConfig::default()
        },
        agent_count: cli.agents,
        profile_mix: if cli.riders {
            SimConfig::rider_mix()
        } else {
            SimConfig::default().profile_mix
        },
        hazard_count: cli.hazards,
        seed: cli.seed,
        strategy: cli.strategy,
        ..SimConfig::default()
    };

    run_headless(config, &cli)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(config: SimConfig, cli: &Cli) -> Result<()> {
    info!("Running traffic simulation in headless mode...");
    info!("Ticks: {}, Delta: {:.4}s", cli.ticks, cli.delta);

    let mut world = SimWorld::new(config).context("Failed to build simulation")?;
    world.start();

    // Log progress once per simulated second
    let ticks_per_second = (1.0 / cli.delta.min(world.config().max_step)).ceil() as u32;

    for tick in 1..=cli.ticks {
        if let Some(strategy) = cli.switch_to {
            if tick == cli.switch_at {
                let rerouted = world.set_strategy(strategy);
                info!("Switched to {:?} at tick {} ({} rerouted)", strategy, tick, rerouted);
            }
        }

        world.update(Some(cli.delta));

        if ticks_per_second > 0 && tick % ticks_per_second == 0 {
            world.stats().log_progress();
        }
    }

    world.pause();

    let stats = world.stats();
    stats.log_summary();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialize statistics")?
        );
    }

    Ok(())
}
