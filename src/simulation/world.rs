//! Main simulation world that ties everything together
//!
//! `SimWorld` owns the road network, the agent population and the
//! orchestrator, and advances them one tick at a time on a single thread.
//! Agents are updated in id order; each reads a snapshot of its neighbours
//! taken right before its own update, so earlier agents in a tick can
//! influence later ones.

use anyhow::{ensure, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

use super::agent::{AgentUpdateResult, SimAgent, LOOKAHEAD_RADIUS};
use super::config::{SimConfig, Strategy};
use super::hazard::{Hazard, HazardField, HazardKind, HazardSource, NoHazards};
use super::orchestrator::{Orchestrator, OrchestratorReport};
use super::profile::AgentProfile;
use super::road_network::SimRoadNetwork;
use super::stats::{RunCounters, SimStats, TickRateCounter};
use super::types::{AgentId, HazardId, IntersectionId, RoadId, SimId};

/// Origin/destination pairs tried before a spawn is given up
pub const MAX_SPAWN_ATTEMPTS: usize = 10;

/// The main simulation world
pub struct SimWorld {
    config: SimConfig,

    /// Road network, intersections and lights
    network: SimRoadNetwork,

    /// All agents, iterated in id order
    agents: BTreeMap<AgentId, SimAgent>,

    orchestrator: Orchestrator,

    hazards: Box<dyn HazardSource>,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,

    next_agent_id: usize,

    running: bool,

    counters: RunCounters,

    stats: SimStats,

    tick_rate: TickRateCounter,
}

impl SimWorld {
    /// Build the grid from `config`, scatter `config.hazard_count` hazards and
    /// spawn the initial population. The world starts paused.
    pub fn new(config: SimConfig) -> Result<Self> {
        let mut world = Self::build(config, Box::new(NoHazards))?;
        if world.config.hazard_count > 0 {
            let field = world.scatter_hazards(world.config.hazard_count);
            info!("Scattered {} hazards", field.len());
            world.hazards = Box::new(field);
        }
        world.spawn_population();
        Ok(world)
    }

    /// Like `new`, but riders react to an externally supplied hazard source
    pub fn with_hazard_source(config: SimConfig, hazards: Box<dyn HazardSource>) -> Result<Self> {
        let mut world = Self::build(config, hazards)?;
        world.spawn_population();
        Ok(world)
    }

    fn build(config: SimConfig, hazards: Box<dyn HazardSource>) -> Result<Self> {
        config.validate()?;
        let network = SimRoadNetwork::from_grid(&config.grid, config.light_timings)?;
        let orchestrator = Orchestrator::new(config.strategy, network.default_corridor());
        let rng = config.seed.map(StdRng::seed_from_u64);

        info!(
            "Built {}x{} grid: {} intersections, {} roads",
            config.grid.rows,
            config.grid.cols,
            network.intersection_count(),
            network.road_count()
        );

        let mut world = Self {
            config,
            network,
            agents: BTreeMap::new(),
            orchestrator,
            hazards,
            rng,
            next_agent_id: 0,
            running: false,
            counters: RunCounters::default(),
            stats: SimStats::default(),
            tick_rate: TickRateCounter::default(),
        };
        world.refresh_stats();
        Ok(world)
    }

    /// Get a random value in the given range, using seeded RNG if available
    fn random_range(&mut self, range: std::ops::Range<f32>) -> f32 {
        if range.start >= range.end {
            return range.start;
        }
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    /// Choose a random element from a slice, using seeded RNG if available
    fn choose_random<T: Copy>(&mut self, slice: &[T]) -> Option<T> {
        match &mut self.rng {
            Some(rng) => slice.choose(rng).copied(),
            None => slice.choose(&mut rand::rng()).copied(),
        }
    }

    fn next_agent_id(&mut self) -> AgentId {
        let id = AgentId(SimId(self.next_agent_id));
        self.next_agent_id += 1;
        id
    }

    fn scatter_hazards(&mut self, count: usize) -> HazardField {
        let road_ids: Vec<RoadId> = self.network.roads().keys().copied().collect();
        let mut hazards = Vec::with_capacity(count);
        for index in 0..count {
            let Some(road_id) = self.choose_random(&road_ids) else {
                break;
            };
            let Ok(length) = self.network.road(road_id).map(|road| road.length) else {
                continue;
            };
            let distance = self.random_range(0.0..length);
            let Ok(position) = self.network.road(road_id).map(|road| road.point_at(distance))
            else {
                continue;
            };
            let kind = self
                .choose_random(&HazardKind::ALL)
                .unwrap_or(HazardKind::Pothole);
            let severity = self.random_range(0.2..1.0);
            hazards.push(Hazard {
                id: HazardId(index),
                kind,
                position,
                severity,
            });
        }
        HazardField::new(hazards)
    }

    fn spawn_population(&mut self) {
        let mix = self.config.profile_mix.clone();
        for _ in 0..self.config.agent_count {
            let profile = self.choose_random(&mix).unwrap_or(AgentProfile::Vehicle);
            self.spawn_random(profile, None);
        }
        info!(
            "Spawned {} of {} agents",
            self.agents.len(),
            self.config.agent_count
        );
        self.refresh_stats();
    }

    /// Spawn an agent between random intersections, optionally starting at
    /// `preferred_origin`, which is then never picked as the destination.
    /// Tries new pairs when no route exists.
    fn spawn_random(
        &mut self,
        profile: AgentProfile,
        preferred_origin: Option<IntersectionId>,
    ) -> Option<AgentId> {
        let intersections = self.network.intersection_ids();
        if intersections.len() < 2 {
            warn!("Need at least two intersections to spawn agents");
            return None;
        }

        for attempt in 0..MAX_SPAWN_ATTEMPTS {
            let origin = match preferred_origin {
                Some(origin) if attempt < MAX_SPAWN_ATTEMPTS / 2 => origin,
                _ => self.choose_random(&intersections)?,
            };
            // A respawned agent never heads back to where it just arrived
            let candidates: Vec<IntersectionId> = intersections
                .iter()
                .copied()
                .filter(|id| *id != origin && Some(*id) != preferred_origin)
                .collect();
            let Some(destination) = self.choose_random(&candidates) else {
                continue;
            };
            match self.spawn_agent(origin, destination, profile) {
                Ok(agent_id) => return Some(agent_id),
                Err(e) => debug!("Spawn attempt {} failed: {:#}", attempt + 1, e),
            }
        }

        warn!(
            "Could not find a routable origin/destination pair for a {:?} after {} attempts",
            profile, MAX_SPAWN_ATTEMPTS
        );
        None
    }

    /// Spawn an agent with a computed route between two known intersections
    pub fn spawn_agent(
        &mut self,
        origin: IntersectionId,
        destination: IntersectionId,
        profile: AgentProfile,
    ) -> Result<AgentId> {
        let position = self.network.intersection(origin)?.position;
        self.network.intersection(destination)?;
        ensure!(
            origin != destination,
            "Origin and destination are both {}",
            origin
        );

        let route = self.network.shortest_path(origin, destination);
        ensure!(!route.is_empty(), "No path from {} to {}", origin, destination);

        let coefficients = profile.coefficients();
        let max_speed = self.random_range(coefficients.min_speed..coefficients.max_speed);

        let id = self.next_agent_id();
        let agent = SimAgent::new(id, profile, origin, destination, route, position, max_speed);
        self.network.track_agent(agent.marker());
        self.agents.insert(id, agent);
        self.counters.total_agents_spawned += 1;
        Ok(id)
    }

    /// Start stepping. Calling it while running does nothing.
    pub fn start(&mut self) {
        if !self.running {
            self.running = true;
            info!("Simulation started under {:?}", self.strategy());
        }
    }

    /// Stop stepping. Calling it while paused does nothing.
    pub fn pause(&mut self) {
        if self.running {
            self.running = false;
            info!("Simulation paused at tick {}", self.counters.tick);
        }
    }

    /// Clear every agent and all dynamic state, then respawn the configured
    /// population. The graph is kept and the world is left paused.
    pub fn reset(&mut self) {
        self.running = false;
        self.agents.clear();
        self.network.reset_dynamic_state();
        self.orchestrator.clear();
        self.counters = RunCounters::default();
        info!("Simulation reset");
        self.spawn_population();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn strategy(&self) -> Strategy {
        self.orchestrator.strategy()
    }

    /// Switch orchestration strategy and reroute every in-flight agent under it.
    /// Returns how many agents got a new route.
    pub fn set_strategy(&mut self, strategy: Strategy) -> usize {
        info!("Switching strategy {:?} -> {:?}", self.strategy(), strategy);
        self.orchestrator.set_strategy(strategy);
        let rerouted = self.orchestrator.reroute_all(&self.network, &mut self.agents);
        self.refresh_stats();
        rerouted
    }

    /// Advance one tick if running. `None` uses the configured default step;
    /// any step is clamped to the configured maximum.
    /// Returns whether a tick ran.
    pub fn update(&mut self, delta_secs: Option<f32>) -> bool {
        if !self.running {
            return false;
        }
        let requested = delta_secs.unwrap_or(self.config.default_step);
        if !requested.is_finite() || requested <= 0.0 {
            return false;
        }
        self.tick(requested.min(self.config.max_step));
        true
    }

    fn tick(&mut self, delta_secs: f32) {
        self.counters.tick += 1;
        self.counters.elapsed_time += delta_secs;

        let (arrived, failed) = self.update_agents(delta_secs);

        self.network.recompute_congestion();

        let report: OrchestratorReport = self.orchestrator.run(&mut self.network, &mut self.agents);
        if report.agents_rerouted > 0 {
            info!(
                "Tick {}: rerouted {} agents around congestion",
                self.counters.tick, report.agents_rerouted
            );
        }

        self.network.update_lights(delta_secs);

        self.tick_rate.frame();
        self.refresh_stats();

        self.respawn(&arrived, &failed);
    }

    /// Move every active agent. Returns (arrived, failed) agents with the
    /// intersection each should respawn from.
    fn update_agents(
        &mut self,
        delta_secs: f32,
    ) -> (Vec<(AgentId, IntersectionId)>, Vec<(AgentId, IntersectionId)>) {
        let mut arrived = Vec::new();
        let mut failed = Vec::new();

        let agent_ids: Vec<AgentId> = self.agents.keys().copied().collect();
        for agent_id in agent_ids {
            let Some(agent) = self.agents.get_mut(&agent_id) else {
                continue;
            };

            let nearby = match agent.active_road() {
                Some(road_id) => self.network.agents_ahead(
                    road_id,
                    agent.distance_along_road,
                    LOOKAHEAD_RADIUS,
                ),
                None => Vec::new(),
            };
            match agent.update(
                delta_secs,
                &mut self.network,
                &nearby,
                self.hazards.as_ref(),
            ) {
                Ok(AgentUpdateResult::Continue) => {}
                Ok(AgentUpdateResult::ArrivedAtDestination(at)) => arrived.push((agent_id, at)),
                Err(e) => {
                    warn!("Agent {} update failed, respawning: {:#}", agent_id, e);
                    failed.push((agent_id, agent.target_intersection.unwrap_or(agent.origin)));
                }
            }
            self.network.track_agent(agent.marker());
        }

        (arrived, failed)
    }

    /// Replace finished agents so the population stays constant
    fn respawn(
        &mut self,
        arrived: &[(AgentId, IntersectionId)],
        failed: &[(AgentId, IntersectionId)],
    ) {
        if arrived.is_empty() && failed.is_empty() {
            return;
        }

        self.counters.trips_completed += arrived.len() as u64;
        for (agent_id, at) in arrived.iter().chain(failed) {
            let Some(old) = self.agents.remove(agent_id) else {
                continue;
            };
            self.network.untrack_agent(*agent_id);
            match self.spawn_random(old.profile, Some(*at)) {
                Some(new_id) => debug!("{} reached {}, respawned as {}", agent_id, at, new_id),
                None => warn!("Failed to respawn {} from {}", agent_id, at),
            }
        }
    }

    fn refresh_stats(&mut self) {
        self.stats = SimStats::collect(
            &self.agents,
            &self.network,
            self.orchestrator.strategy(),
            self.counters,
            self.tick_rate.rate(),
        );
    }

    /// Snapshot of the latest statistics
    pub fn stats(&self) -> SimStats {
        self.stats.clone()
    }

    /// Measured engine updates per wall-clock second
    pub fn tick_rate(&self) -> f32 {
        self.tick_rate.rate()
    }

    pub fn tick_count(&self) -> u64 {
        self.counters.tick
    }

    /// Simulated seconds since start or last reset
    pub fn time(&self) -> f32 {
        self.counters.elapsed_time
    }

    pub fn agents(&self) -> impl Iterator<Item = &SimAgent> {
        self.agents.values()
    }

    pub fn agent(&self, agent_id: AgentId) -> Option<&SimAgent> {
        self.agents.get(&agent_id)
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn network(&self) -> &SimRoadNetwork {
        &self.network
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Feed a live density reading for a road (or clear it with `None`)
    pub fn set_live_density(&mut self, road_id: RoadId, density: Option<f32>) -> Result<()> {
        self.network.set_live_density(road_id, density)?;
        self.refresh_stats();
        Ok(())
    }
}
