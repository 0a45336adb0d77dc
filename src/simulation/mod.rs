//! Standalone traffic simulation module
//!
//! Road graph, agents, traffic lights, congestion forecasting and the
//! orchestrator that retimes lights and reroutes agents, all driven by
//! `SimWorld` one tick at a time.

mod agent;
mod config;
mod hazard;
mod intersection;
mod orchestrator;
mod pathfinding;
mod predictor;
mod profile;
mod road;
mod road_network;
mod stats;
mod traffic_light;
mod types;
mod world;

pub use agent::{
    AgentState, AgentUpdateResult, SimAgent, ACCELERATION, DECELERATION, FOLLOW_SPEED_FACTOR,
    HAZARD_SCAN_RADIUS, LOOKAHEAD_RADIUS, NEAR_MISS_RADIUS, SAFETY_DISTANCE, STOP_LINE_OFFSET,
    STOP_ZONE_FRACTION,
};
pub use config::{GridConfig, LightTimings, SimConfig, Strategy};
pub use hazard::{Hazard, HazardField, HazardKind, HazardSource, NoHazards};
pub use intersection::{initial_light_state, SimIntersection, WAIT_PER_QUEUED_AGENT};
pub use orchestrator::{
    congested_roads, Orchestrator, OrchestratorReport, CONGESTED_FORECAST, GREEN_WAVE_OFFSET,
    MAX_REROUTES_PER_PASS, REROUTE_INTERVAL,
};
pub use pathfinding::{intersections_along, shortest_path, shortest_path_avoiding};
pub use predictor::{CongestionPredictor, Prediction, HISTORY_CAPACITY, HORIZONS};
pub use profile::{AgentProfile, ProfileCoefficients};
pub use road::{SimRoad, MAX_DENSITY};
pub use road_network::{AgentMarker, CongestionCounts, RoadEdge, SimRoadNetwork};
pub use stats::{RunCounters, SimStats, TickRateCounter};
pub use traffic_light::{LightState, TrafficLight};
pub use types::{
    kmh_to_ms, AgentId, CongestionLevel, Direction, HazardId, IntersectionId, LightId, Position,
    RoadId, SimId, GRIDLOCK_DENSITY, HEAVY_DENSITY, MODERATE_DENSITY,
};
pub use world::{SimWorld, MAX_SPAWN_ATTEMPTS};
