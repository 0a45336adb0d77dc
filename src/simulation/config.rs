//! Simulation configuration
//!
//! Everything the engine needs at construction time lives here. The engine
//! owns its configuration; there is no process-wide state.

use anyhow::{ensure, Result};
use serde::Serialize;

use super::profile::AgentProfile;

/// Orchestration strategy controlling how much the orchestrator intervenes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
pub enum Strategy {
    /// Fixed light timings, no rerouting
    #[default]
    Default,
    /// Retime green phases from the congestion forecast
    Predictive,
    /// Predictive retiming plus lane priority, rerouting, green waves and emergency relief
    Aurora,
}

/// Target durations for each light phase, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightTimings {
    pub green: f32,
    pub yellow: f32,
    pub red: f32,
}

impl Default for LightTimings {
    /// Red equals green plus yellow so opposing headings alternate on a 60s cycle
    fn default() -> Self {
        Self {
            green: 25.0,
            yellow: 5.0,
            red: 30.0,
        }
    }
}

/// Shape of the generated grid network
#[derive(Debug, Clone, PartialEq)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    /// Distance between adjacent intersections in meters
    pub spacing: f32,
    pub lanes: u32,
    /// Speed limit in km/h
    pub speed_limit: f32,
    /// Grid cells (row, col) that get a stop sign instead of lights
    pub unsignalized: Vec<(usize, usize)>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 3,
            spacing: 200.0,
            lanes: 2,
            speed_limit: 50.0,
            unsignalized: Vec::new(),
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub grid: GridConfig,
    pub light_timings: LightTimings,
    /// Constant population size
    pub agent_count: usize,
    /// Profiles new agents are drawn from, uniformly
    pub profile_mix: Vec<AgentProfile>,
    /// Number of randomly placed hazards riders react to
    pub hazard_count: usize,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
    pub strategy: Strategy,
    /// Largest step a single tick may advance, in seconds
    pub max_step: f32,
    /// Step used when `update` is called without an explicit delta
    pub default_step: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            light_timings: LightTimings::default(),
            agent_count: 40,
            profile_mix: vec![AgentProfile::Vehicle],
            hazard_count: 0,
            seed: None,
            strategy: Strategy::Default,
            max_step: 0.1,
            default_step: 1.0 / 60.0,
        }
    }
}

impl SimConfig {
    /// Mix of every rider profile, used by the rider variant of the simulation
    pub fn rider_mix() -> Vec<AgentProfile> {
        vec![
            AgentProfile::DeliveryRider,
            AgentProfile::Commuter,
            AgentProfile::EBike,
            AgentProfile::Scooter,
            AgentProfile::PersonalMotorcycle,
        ]
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.grid.rows > 0 && self.grid.cols > 0,
            "Grid must have at least one row and column, got {}x{}",
            self.grid.rows,
            self.grid.cols
        );
        ensure!(
            self.grid.spacing > 0.0,
            "Grid spacing must be positive, got {}",
            self.grid.spacing
        );
        ensure!(self.grid.lanes > 0, "Roads need at least one lane");
        ensure!(
            self.grid.speed_limit > 0.0,
            "Speed limit must be positive, got {}",
            self.grid.speed_limit
        );
        ensure!(
            self.light_timings.green > 0.0
                && self.light_timings.yellow > 0.0
                && self.light_timings.red > 0.0,
            "Light durations must be positive: {:?}",
            self.light_timings
        );
        ensure!(
            self.max_step > 0.0,
            "Max step must be positive, got {}",
            self.max_step
        );
        ensure!(
            self.default_step > 0.0,
            "Default step must be positive, got {}",
            self.default_step
        );
        ensure!(
            !self.profile_mix.is_empty(),
            "Profile mix must name at least one agent profile"
        );
        Ok(())
    }
}
