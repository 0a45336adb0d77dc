//! Agent movement logic for the traffic simulation
//!
//! One agent type covers plain vehicles and every rider variant. The profile
//! only changes coefficients; the kinematics, car-following and queueing are
//! shared.

use anyhow::{Context, Result};
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet};

use super::hazard::HazardSource;
use super::profile::AgentProfile;
use super::road_network::{AgentMarker, SimRoadNetwork};
use super::types::{kmh_to_ms, AgentId, HazardId, IntersectionId, Position, RoadId};

/// How far ahead on the same road an agent looks for a leader, meters
pub const LOOKAHEAD_RADIUS: f32 = 30.0;

/// Gap under which an agent slows down to follow its leader, meters
pub const SAFETY_DISTANCE: f32 = 15.0;

/// Share of the leader's speed a follower matches
pub const FOLLOW_SPEED_FACTOR: f32 = 0.8;

/// Fraction of the road after which a red light makes the agent stop
pub const STOP_ZONE_FRACTION: f32 = 0.8;

/// km/h gained per second
pub const ACCELERATION: f32 = 10.0;

/// km/h lost per second when braking for a light
pub const DECELERATION: f32 = 20.0;

/// Waiting agents never get closer than this to the road end, meters
pub const STOP_LINE_OFFSET: f32 = 1.0;

/// Radius riders scan for hazards, meters
pub const HAZARD_SCAN_RADIUS: f32 = 30.0;

/// Closest approach that counts as a near miss, meters
pub const NEAR_MISS_RADIUS: f32 = 5.0;

const NEAR_MISS_STRESS: f32 = 20.0;
const NEAR_MISS_SAFETY_PENALTY: f32 = 10.0;
const STRESS_RECOVERY_RATE: f32 = 0.5;
const WAITING_FATIGUE_MULTIPLIER: f32 = 1.5;
const STAT_CEILING: f32 = 100.0;

/// Result of an agent update indicating what the engine should do next
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AgentUpdateResult {
    Continue,
    ArrivedAtDestination(IntersectionId),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct TrackedHazard {
    closest: f32,
    severity: f32,
}

/// Observational statistics an agent accumulates.
/// They never feed back into road or intersection state.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentState {
    pub stress: f32,
    pub fatigue: f32,
    pub safety_score: f32,
    pub hazards_avoided: u32,
    pub near_misses: u32,
    /// Seconds saved by accepted reroutes
    pub time_saved: f32,
    tracked_hazards: BTreeMap<HazardId, TrackedHazard>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            stress: 0.0,
            fatigue: 0.0,
            safety_score: STAT_CEILING,
            hazards_avoided: 0,
            near_misses: 0,
            time_saved: 0.0,
            tracked_hazards: BTreeMap::new(),
        }
    }
}

/// A vehicle or rider moving through the network
#[derive(Debug, Clone, PartialEq)]
pub struct SimAgent {
    pub id: AgentId,
    pub profile: AgentProfile,
    pub position: Position,
    pub current_road: Option<RoadId>,
    /// Intersection the agent is heading to (or standing at between roads)
    pub target_intersection: Option<IntersectionId>,
    pub origin: IntersectionId,
    pub destination: IntersectionId,
    route: Vec<RoadId>,
    route_index: usize,
    pub distance_along_road: f32,
    /// km/h
    pub speed: f32,
    /// km/h
    pub max_speed: f32,
    pub is_waiting: bool,
    pub wait_time: f32,
    pub has_reached_destination: bool,
    pub rerouted: bool,
    pub state: AgentState,
}

impl SimAgent {
    pub fn new(
        id: AgentId,
        profile: AgentProfile,
        origin: IntersectionId,
        destination: IntersectionId,
        route: Vec<RoadId>,
        position: Position,
        max_speed: f32,
    ) -> Self {
        Self {
            id,
            profile,
            position,
            current_road: None,
            target_intersection: Some(origin),
            origin,
            destination,
            route,
            route_index: 0,
            distance_along_road: 0.0,
            speed: 0.0,
            max_speed,
            is_waiting: false,
            wait_time: 0.0,
            has_reached_destination: false,
            rerouted: false,
            state: AgentState::default(),
        }
    }

    pub fn route(&self) -> &[RoadId] {
        &self.route
    }

    /// Index of the road being driven, or of the next road to enter
    pub fn route_index(&self) -> usize {
        self.route_index
    }

    /// Road the next update drives on: the current one, or the one about to be entered
    pub fn active_road(&self) -> Option<RoadId> {
        self.current_road
            .or_else(|| self.route.get(self.route_index).copied())
    }

    /// Roads the agent has not entered yet
    pub fn upcoming_roads(&self) -> &[RoadId] {
        let start = if self.current_road.is_some() {
            self.route_index + 1
        } else {
            self.route_index
        };
        &self.route[start.min(self.route.len())..]
    }

    /// Intersection a new route would have to start from
    pub fn replan_origin(&self, network: &SimRoadNetwork) -> Option<IntersectionId> {
        if self.has_reached_destination {
            return None;
        }
        match self.current_road {
            Some(road_id) => network.road(road_id).ok().map(|road| road.end_intersection),
            None => self
                .route
                .get(self.route_index)
                .and_then(|road_id| network.road(*road_id).ok())
                .map(|road| road.start_intersection),
        }
    }

    /// Swap every road not yet entered for `upcoming`
    pub fn replace_upcoming_route(&mut self, upcoming: Vec<RoadId>, time_saved: f32) {
        let keep = if self.current_road.is_some() {
            self.route_index + 1
        } else {
            self.route_index
        };
        self.route.truncate(keep.min(self.route.len()));
        self.route.extend(upcoming);
        self.rerouted = true;
        if time_saved > 0.0 {
            self.state.time_saved += time_saved;
        }
    }

    pub fn marker(&self) -> AgentMarker {
        AgentMarker {
            id: self.id,
            road: self.current_road,
            distance_along_road: self.distance_along_road,
            speed: self.speed,
            position: self.position,
        }
    }

    /// Update agent movement for one tick
    ///
    /// `nearby` is the snapshot of agents ahead of this one taken right before
    /// its own update. Markers on other roads are ignored.
    pub fn update(
        &mut self,
        delta_secs: f32,
        network: &mut SimRoadNetwork,
        nearby: &[AgentMarker],
        hazards: &dyn HazardSource,
    ) -> Result<AgentUpdateResult> {
        if self.has_reached_destination {
            return Ok(AgentUpdateResult::ArrivedAtDestination(self.destination));
        }

        let road_id = match self.current_road {
            Some(road_id) => road_id,
            None => match self.route.get(self.route_index).copied() {
                Some(next_road) => {
                    self.enter_road(next_road, network)?;
                    next_road
                }
                None => {
                    self.has_reached_destination = true;
                    self.target_intersection = None;
                    return Ok(AgentUpdateResult::ArrivedAtDestination(self.destination));
                }
            },
        };

        let (length, end_intersection, direction, road_speed) = {
            let road = network.road(road_id)?;
            (
                road.length,
                road.end_intersection,
                road.direction,
                road.current_speed,
            )
        };

        let follow_cap = self
            .leader_speed(road_id, nearby)
            .map(|leader_speed| leader_speed * FOLLOW_SPEED_FACTOR);
        if let Some(cap) = follow_cap {
            self.speed = self.speed.min(cap);
        }

        let passable = network.intersection(end_intersection)?.can_pass(direction);
        let in_stop_zone = self.distance_along_road >= STOP_ZONE_FRACTION * length;

        if !passable && in_stop_zone {
            self.speed = (self.speed - DECELERATION * delta_secs).max(0.0);
            self.is_waiting = true;
            self.wait_time += delta_secs;
            network
                .intersection_mut(end_intersection)?
                .enqueue(direction, self.id);
        } else {
            let mut target = road_speed.min(self.max_speed);
            if let Some(cap) = follow_cap {
                target = target.min(cap);
            }
            self.speed = if self.speed < target {
                (self.speed + ACCELERATION * delta_secs).min(target)
            } else {
                target
            };

            if self.is_waiting {
                self.is_waiting = false;
                network
                    .intersection_mut(end_intersection)?
                    .dequeue(self.id);
                self.wait_time = 0.0;
            }
        }

        let mut new_distance = self.distance_along_road + kmh_to_ms(self.speed) * delta_secs;
        if self.is_waiting {
            let stop_line = (length - STOP_LINE_OFFSET).max(self.distance_along_road);
            new_distance = new_distance.min(stop_line);
        }
        self.distance_along_road = new_distance;

        let result = if self.distance_along_road >= length {
            let end_position = network.intersection(end_intersection)?.position;
            self.finish_road(end_intersection, end_position)
        } else {
            self.position = network
                .road(road_id)
                .context("Current road vanished mid-update")?
                .point_at(self.distance_along_road);
            AgentUpdateResult::Continue
        };

        // Hazards are scanned from where the agent ended up this tick
        if self.profile.is_rider() {
            self.update_rider_state(delta_secs, hazards);
        }

        Ok(result)
    }

    fn enter_road(&mut self, road_id: RoadId, network: &SimRoadNetwork) -> Result<()> {
        let road = network.road(road_id)?;
        self.current_road = Some(road_id);
        self.distance_along_road = 0.0;
        self.target_intersection = Some(road.end_intersection);
        self.position = road.point_at(0.0);
        Ok(())
    }

    fn finish_road(&mut self, reached: IntersectionId, position: Position) -> AgentUpdateResult {
        self.route_index += 1;
        self.current_road = None;
        self.distance_along_road = 0.0;
        self.position = position;

        if self.route_index >= self.route.len() {
            self.route_index = self.route.len();
            self.has_reached_destination = true;
            self.target_intersection = None;
            return AgentUpdateResult::ArrivedAtDestination(reached);
        }

        self.target_intersection = Some(reached);
        AgentUpdateResult::Continue
    }

    /// Speed of the nearest agent ahead on the same road within the safety distance
    fn leader_speed(&self, road_id: RoadId, nearby: &[AgentMarker]) -> Option<f32> {
        nearby
            .iter()
            .filter(|other| other.id != self.id && other.road == Some(road_id))
            .map(|other| (other.distance_along_road - self.distance_along_road, other.speed))
            .filter(|(gap, _)| *gap > 0.0 && *gap <= LOOKAHEAD_RADIUS)
            .min_by_key(|(gap, _)| OrderedFloat(*gap))
            .filter(|(gap, _)| *gap < SAFETY_DISTANCE)
            .map(|(_, speed)| speed)
    }

    fn update_rider_state(&mut self, delta_secs: f32, hazards: &dyn HazardSource) {
        let coefficients = self.profile.coefficients();
        let state = &mut self.state;

        let in_range = hazards.hazards_near(&self.position, HAZARD_SCAN_RADIUS);
        let mut present = BTreeSet::new();
        for hazard in &in_range {
            let distance = hazard.position.distance(&self.position);
            present.insert(hazard.id);
            state
                .tracked_hazards
                .entry(hazard.id)
                .and_modify(|tracked| tracked.closest = tracked.closest.min(distance))
                .or_insert(TrackedHazard {
                    closest: distance,
                    severity: hazard.severity,
                });
        }

        let passed: Vec<HazardId> = state
            .tracked_hazards
            .keys()
            .filter(|id| !present.contains(id))
            .copied()
            .collect();
        for hazard_id in passed {
            let Some(tracked) = state.tracked_hazards.remove(&hazard_id) else {
                continue;
            };
            if tracked.closest <= NEAR_MISS_RADIUS {
                let weight = tracked.severity * coefficients.hazard_sensitivity;
                state.near_misses += 1;
                state.stress += NEAR_MISS_STRESS * weight;
                state.safety_score -= NEAR_MISS_SAFETY_PENALTY * weight;
            } else {
                state.hazards_avoided += 1;
            }
        }

        let fatigue_multiplier = if self.is_waiting {
            WAITING_FATIGUE_MULTIPLIER
        } else {
            1.0
        };
        state.fatigue += coefficients.fatigue_rate * delta_secs * fatigue_multiplier;

        if self.is_waiting {
            state.stress += coefficients.stress_rate * delta_secs;
        } else {
            state.stress -= STRESS_RECOVERY_RATE * delta_secs;
        }

        state.stress = state.stress.clamp(0.0, STAT_CEILING);
        state.fatigue = state.fatigue.clamp(0.0, STAT_CEILING);
        state.safety_score = state.safety_score.clamp(0.0, STAT_CEILING);
    }
}
