//! Aggregated simulation statistics
//!
//! `SimStats` is an owned snapshot: observers get a copy and cannot reach
//! back into simulation state through it.

use log::info;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use super::agent::SimAgent;
use super::config::Strategy;
use super::road_network::{CongestionCounts, SimRoadNetwork};
use super::types::AgentId;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimStats {
    pub tick: u64,
    /// Simulated seconds
    pub elapsed_time: f32,
    pub strategy: Strategy,
    pub active_agents: usize,
    pub total_agents_spawned: u64,
    pub trips_completed: u64,
    /// km/h, over active agents
    pub average_speed: f32,
    /// Seconds, over active agents
    pub average_wait_time: f32,
    pub total_wait_time: f32,
    pub waiting_agents: usize,
    pub rerouted_agents: usize,
    pub total_queued: usize,
    pub roads_by_level: CongestionCounts,
    pub riders: usize,
    pub average_stress: f32,
    pub average_fatigue: f32,
    pub average_safety_score: f32,
    pub hazards_avoided: u64,
    pub near_misses: u64,
    pub total_time_saved: f32,
    /// Engine updates per wall-clock second
    pub tick_rate: f32,
}

/// Lifetime counters the engine keeps alongside the per-tick aggregates
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunCounters {
    pub tick: u64,
    pub elapsed_time: f32,
    pub total_agents_spawned: u64,
    pub trips_completed: u64,
}

impl SimStats {
    /// Aggregate the current population and network state
    pub fn collect(
        agents: &BTreeMap<AgentId, SimAgent>,
        network: &SimRoadNetwork,
        strategy: Strategy,
        counters: RunCounters,
        tick_rate: f32,
    ) -> Self {
        let active: Vec<&SimAgent> = agents
            .values()
            .filter(|agent| !agent.has_reached_destination)
            .collect();
        let riders: Vec<&&SimAgent> = active
            .iter()
            .filter(|agent| agent.profile.is_rider())
            .collect();

        let mean = |total: f32, count: usize| {
            if count == 0 {
                0.0
            } else {
                total / count as f32
            }
        };

        let total_speed: f32 = active.iter().map(|agent| agent.speed).sum();
        let total_wait_time: f32 = active.iter().map(|agent| agent.wait_time).sum();

        Self {
            tick: counters.tick,
            elapsed_time: counters.elapsed_time,
            strategy,
            active_agents: active.len(),
            total_agents_spawned: counters.total_agents_spawned,
            trips_completed: counters.trips_completed,
            average_speed: mean(total_speed, active.len()),
            average_wait_time: mean(total_wait_time, active.len()),
            total_wait_time,
            waiting_agents: active.iter().filter(|agent| agent.is_waiting).count(),
            rerouted_agents: active.iter().filter(|agent| agent.rerouted).count(),
            total_queued: network.total_queued(),
            roads_by_level: network.congestion_counts(),
            riders: riders.len(),
            average_stress: mean(
                riders.iter().map(|agent| agent.state.stress).sum(),
                riders.len(),
            ),
            average_fatigue: mean(
                riders.iter().map(|agent| agent.state.fatigue).sum(),
                riders.len(),
            ),
            average_safety_score: mean(
                riders.iter().map(|agent| agent.state.safety_score).sum(),
                riders.len(),
            ),
            hazards_avoided: riders
                .iter()
                .map(|agent| u64::from(agent.state.hazards_avoided))
                .sum(),
            near_misses: riders
                .iter()
                .map(|agent| u64::from(agent.state.near_misses))
                .sum(),
            total_time_saved: active.iter().map(|agent| agent.state.time_saved).sum(),
            tick_rate,
        }
    }

    /// Log a one-line progress summary
    pub fn log_progress(&self) {
        info!(
            "t={:.1}s tick={} strategy={:?} active={} completed={} avg_speed={:.1}km/h waiting={} queued={} levels={}/{}/{}/{}",
            self.elapsed_time,
            self.tick,
            self.strategy,
            self.active_agents,
            self.trips_completed,
            self.average_speed,
            self.waiting_agents,
            self.total_queued,
            self.roads_by_level.free,
            self.roads_by_level.moderate,
            self.roads_by_level.heavy,
            self.roads_by_level.gridlock,
        );
    }

    /// Log the end-of-run report
    pub fn log_summary(&self) {
        info!("=== SIMULATION COMPLETE ===");
        info!("Elapsed time: {:.2}s", self.elapsed_time);
        info!("Ticks: {}", self.tick);
        info!("Strategy: {:?}", self.strategy);
        info!("Total agents spawned: {}", self.total_agents_spawned);
        info!("Trips completed: {}", self.trips_completed);
        info!("Active agents: {}", self.active_agents);
        info!("Average speed: {:.1} km/h", self.average_speed);
        info!("Average wait time: {:.2}s", self.average_wait_time);
        info!("Rerouted agents: {}", self.rerouted_agents);
        info!(
            "Roads by level: free={} moderate={} heavy={} gridlock={}",
            self.roads_by_level.free,
            self.roads_by_level.moderate,
            self.roads_by_level.heavy,
            self.roads_by_level.gridlock
        );
        if self.riders > 0 {
            info!(
                "Riders: {} stress={:.1} fatigue={:.1} safety={:.1} avoided={} near_misses={}",
                self.riders,
                self.average_stress,
                self.average_fatigue,
                self.average_safety_score,
                self.hazards_avoided,
                self.near_misses
            );
        }
    }
}

/// Counts engine updates per wall-clock second
#[derive(Debug, Clone)]
pub struct TickRateCounter {
    window_start: Instant,
    frames: u32,
    rate: f32,
}

impl Default for TickRateCounter {
    fn default() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            rate: 0.0,
        }
    }
}

impl TickRateCounter {
    pub fn frame(&mut self) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            self.rate = self.frames as f32 / elapsed;
            self.frames = 0;
            self.window_start = Instant::now();
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}
