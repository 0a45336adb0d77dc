//! Strategy-driven traffic orchestration
//!
//! The orchestrator runs once per tick. DEFAULT leaves the lights alone,
//! PREDICTIVE retimes green phases from the congestion forecast, and AURORA
//! layers lane priority, periodic rerouting, green-wave coordination and
//! emergency relief on top of that.

use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

use super::agent::SimAgent;
use super::config::Strategy;
use super::predictor::{CongestionPredictor, Prediction};
use super::road_network::SimRoadNetwork;
use super::traffic_light::LightState;
use super::types::{AgentId, Direction, IntersectionId, RoadId};

/// AURORA reroutes on every Nth invocation
pub const REROUTE_INTERVAL: u64 = 60;

/// +20s forecast above which a road counts as congested
pub const CONGESTED_FORECAST: f32 = 40.0;

/// Agents rerouted per periodic pass
pub const MAX_REROUTES_PER_PASS: usize = 5;

/// Seconds of offset between consecutive corridor intersections
pub const GREEN_WAVE_OFFSET: f32 = 5.0;

const MIN_WAVE_REMAINING: f32 = 1.0;

const HIGH_FORECAST: f32 = 0.4;
const LOW_FORECAST: f32 = 0.2;
const HIGH_QUEUE: usize = 3;
const LOW_QUEUE: usize = 2;
const GREEN_INCREASE_FACTOR: f32 = 1.3;
const GREEN_INCREASE_RANGE: (f32, f32) = (10.0, 35.0);
const GREEN_DECREASE_FACTOR: f32 = 0.9;
const GREEN_DECREASE_RANGE: (f32, f32) = (8.0, 20.0);

const LANE_PRIORITY_QUEUE: usize = 5;
const PRIORITY_GREEN: f32 = 30.0;
const PRIORITY_RED: f32 = 10.0;
const YIELDING_GREEN: f32 = 12.0;
const YIELDING_RED: f32 = 25.0;

const EMERGENCY_TOTAL_QUEUE: usize = 15;
const EMERGENCY_DIRECTION_QUEUE: usize = 5;
const EMERGENCY_GREEN: f32 = 40.0;
const EMERGENCY_RED: f32 = 5.0;

/// What a single orchestrator pass changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrchestratorReport {
    pub lights_retimed: usize,
    pub priority_boosts: usize,
    pub agents_rerouted: usize,
    pub green_wave_applied: bool,
    pub emergency_reliefs: usize,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    strategy: Strategy,
    predictor: CongestionPredictor,
    invocations: u64,
    /// Intersections coordinated by the green wave, in order
    corridor: Vec<IntersectionId>,
    wave_head_state: Option<LightState>,
    relief_cursor: BTreeMap<IntersectionId, usize>,
    last_predictions: BTreeMap<RoadId, Prediction>,
}

impl Orchestrator {
    pub fn new(strategy: Strategy, corridor: Vec<IntersectionId>) -> Self {
        Self {
            strategy,
            predictor: CongestionPredictor::new(),
            invocations: 0,
            corridor,
            wave_head_state: None,
            relief_cursor: BTreeMap::new(),
            last_predictions: BTreeMap::new(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Switch strategy. Predictions never carry over between strategies.
    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
        self.clear();
    }

    /// Drop history, predictions and pass counters
    pub fn clear(&mut self) {
        self.predictor.clear();
        self.invocations = 0;
        self.wave_head_state = None;
        self.relief_cursor.clear();
        self.last_predictions.clear();
    }

    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn predictor(&self) -> &CongestionPredictor {
        &self.predictor
    }

    /// Predictions from the most recent pass
    pub fn last_predictions(&self) -> &BTreeMap<RoadId, Prediction> {
        &self.last_predictions
    }

    pub fn corridor(&self) -> &[IntersectionId] {
        &self.corridor
    }

    /// Run one pass of the active strategy
    pub fn run(
        &mut self,
        network: &mut SimRoadNetwork,
        agents: &mut BTreeMap<AgentId, SimAgent>,
    ) -> OrchestratorReport {
        let mut report = OrchestratorReport::default();

        match self.strategy {
            Strategy::Default => {}
            Strategy::Predictive => {
                self.invocations += 1;
                let predictions = self.refresh_predictions(network);
                report.lights_retimed = retime_from_forecast(network, &predictions);
            }
            Strategy::Aurora => {
                self.invocations += 1;
                let predictions = self.refresh_predictions(network);
                report.lights_retimed = retime_from_forecast(network, &predictions);
                report.priority_boosts = apply_lane_priority(network);

                if self.invocations % REROUTE_INTERVAL == 0 {
                    report.agents_rerouted = reroute_around_congestion(
                        network,
                        agents,
                        &predictions,
                        Some(MAX_REROUTES_PER_PASS),
                    );
                }

                report.green_wave_applied = self.coordinate_green_wave(network);
                report.emergency_reliefs = self.relieve_gridlock(network);
            }
        }

        if report != OrchestratorReport::default() {
            debug!("Orchestrator pass {}: {:?}", self.invocations, report);
        }
        report
    }

    /// Reroute every in-flight agent under the active strategy's path rule.
    /// Returns the number of agents whose route changed.
    pub fn reroute_all(
        &mut self,
        network: &SimRoadNetwork,
        agents: &mut BTreeMap<AgentId, SimAgent>,
    ) -> usize {
        let rerouted = match self.strategy {
            Strategy::Default | Strategy::Predictive => reroute_shortest(network, agents),
            Strategy::Aurora => {
                let predictions = self.refresh_predictions(network);
                reroute_around_congestion(network, agents, &predictions, None)
            }
        };
        info!(
            "Full rerouting pass under {:?}: {} agents rerouted",
            self.strategy, rerouted
        );
        rerouted
    }

    fn refresh_predictions(&mut self, network: &SimRoadNetwork) -> BTreeMap<RoadId, Prediction> {
        self.predictor.record(network);
        let predictions = self.predictor.predict(network);
        self.last_predictions = predictions.clone();
        predictions
    }

    /// Stagger east/west lights along the corridor each time its head turns green.
    ///
    /// This overwrites the countdown of phases already in progress, which can
    /// cut a phase short or stretch it. Corridor synchrony wins over phase
    /// fairness here.
    fn coordinate_green_wave(&mut self, network: &mut SimRoadNetwork) -> bool {
        let Some(&head) = self.corridor.first() else {
            return false;
        };
        let head_light = network
            .intersection(head)
            .ok()
            .and_then(|intersection| intersection.light(Direction::East))
            .map(|light| (light.state(), light.remaining_time()));
        let Some((head_state, head_remaining)) = head_light else {
            return false;
        };

        let entered_green =
            head_state == LightState::Green && self.wave_head_state != Some(LightState::Green);
        self.wave_head_state = Some(head_state);
        if !entered_green {
            return false;
        }

        for (hop, intersection_id) in self.corridor.iter().enumerate().skip(1) {
            let offset = hop as f32 * GREEN_WAVE_OFFSET;
            let Ok(intersection) = network.intersection_mut(*intersection_id) else {
                continue;
            };
            for direction in [Direction::East, Direction::West] {
                let Some(light) = intersection.light_mut(direction) else {
                    continue;
                };
                match light.state() {
                    LightState::Red => {
                        light.override_remaining_time(offset.max(MIN_WAVE_REMAINING))
                    }
                    LightState::Green => light
                        .override_remaining_time((head_remaining + offset).max(MIN_WAVE_REMAINING)),
                    LightState::Yellow => {}
                }
            }
        }
        true
    }

    /// Give one overloaded heading per gridlocked intersection a long green.
    /// Headings take turns across passes.
    fn relieve_gridlock(&mut self, network: &mut SimRoadNetwork) -> usize {
        let mut relieved = 0;
        for intersection_id in network.intersection_ids() {
            let Ok(intersection) = network.intersection_mut(intersection_id) else {
                continue;
            };
            if !intersection.signalized || intersection.total_queued() <= EMERGENCY_TOTAL_QUEUE {
                continue;
            }

            let overloaded: Vec<Direction> = Direction::ALL
                .into_iter()
                .filter(|direction| intersection.queue_len(*direction) > EMERGENCY_DIRECTION_QUEUE)
                .filter(|direction| intersection.light(*direction).is_some())
                .collect();
            if overloaded.is_empty() {
                continue;
            }

            let cursor = self.relief_cursor.entry(intersection_id).or_insert(0);
            let direction = overloaded[*cursor % overloaded.len()];
            *cursor += 1;

            if let Some(light) = intersection.light_mut(direction) {
                light.set_green_duration(EMERGENCY_GREEN);
                light.set_red_duration(EMERGENCY_RED);
                relieved += 1;
                info!(
                    "Emergency relief at {}: {:?} green {}s / red {}s",
                    intersection_id, direction, EMERGENCY_GREEN, EMERGENCY_RED
                );
            }
        }
        relieved
    }
}

/// Retune each heading's green from the averaged +20s forecast of the roads feeding it
fn retime_from_forecast(
    network: &mut SimRoadNetwork,
    predictions: &BTreeMap<RoadId, Prediction>,
) -> usize {
    let mut retimed = 0;
    for intersection_id in network.intersection_ids() {
        let mut forecasts = Vec::with_capacity(Direction::ALL.len());
        for direction in Direction::ALL {
            let feeding = network.roads_into(intersection_id, direction);
            let average = if feeding.is_empty() {
                0.0
            } else {
                let total: f32 = feeding
                    .iter()
                    .filter_map(|road_id| predictions.get(road_id))
                    .map(|prediction| prediction.forecast_20s)
                    .sum();
                total / feeding.len() as f32
            };
            forecasts.push((direction, average / 100.0));
        }

        let Ok(intersection) = network.intersection_mut(intersection_id) else {
            continue;
        };
        if !intersection.signalized {
            continue;
        }

        for (direction, predicted) in forecasts {
            let queue = intersection.queue_len(direction);
            let Some(light) = intersection.light_mut(direction) else {
                continue;
            };
            let green = light.green_duration();
            if predicted > HIGH_FORECAST || queue > HIGH_QUEUE {
                let (low, high) = GREEN_INCREASE_RANGE;
                light.set_green_duration((green * GREEN_INCREASE_FACTOR).clamp(low, high));
                retimed += 1;
            } else if predicted < LOW_FORECAST && queue < LOW_QUEUE {
                let (low, high) = GREEN_DECREASE_RANGE;
                light.set_green_duration((green * GREEN_DECREASE_FACTOR).clamp(low, high));
                retimed += 1;
            }
        }
    }
    retimed
}

/// Favour the heading with the longest queue when it is long enough
fn apply_lane_priority(network: &mut SimRoadNetwork) -> usize {
    let mut boosted = 0;
    for intersection_id in network.intersection_ids() {
        let Ok(intersection) = network.intersection_mut(intersection_id) else {
            continue;
        };
        if !intersection.signalized {
            continue;
        }
        let Some((busiest, length)) = intersection.longest_queue() else {
            continue;
        };
        if length <= LANE_PRIORITY_QUEUE {
            continue;
        }
        for light in intersection.lights_mut() {
            if light.direction == busiest {
                light.set_green_duration(PRIORITY_GREEN);
                light.set_red_duration(PRIORITY_RED);
            } else {
                light.set_green_duration(YIELDING_GREEN);
                light.set_red_duration(YIELDING_RED);
            }
        }
        boosted += 1;
    }
    boosted
}

/// Roads whose +20s forecast is above the congestion threshold
pub fn congested_roads(predictions: &BTreeMap<RoadId, Prediction>) -> BTreeSet<RoadId> {
    predictions
        .values()
        .filter(|prediction| prediction.forecast_20s > CONGESTED_FORECAST)
        .map(|prediction| prediction.road_id)
        .collect()
}

/// A non-empty route from `from` to `to` that avoids every congested road.
/// Prefers the plain shortest path when it is already clear.
fn congestion_free_path(
    network: &SimRoadNetwork,
    from: IntersectionId,
    to: IntersectionId,
    congested: &BTreeSet<RoadId>,
) -> Option<Vec<RoadId>> {
    if from == to {
        return None;
    }
    let plain = network.shortest_path(from, to);
    if !plain.is_empty() && !plain.iter().any(|road_id| congested.contains(road_id)) {
        return Some(plain);
    }
    let detour = network.shortest_path_avoiding(from, to, congested);
    if detour.is_empty() {
        None
    } else {
        Some(detour)
    }
}

fn route_travel_time(network: &SimRoadNetwork, route: &[RoadId]) -> f32 {
    route
        .iter()
        .filter_map(|road_id| network.road(*road_id).ok())
        .map(|road| road.travel_time())
        .sum()
}

/// Move agents whose upcoming roads touch congestion onto clear routes.
/// Agents without a clear alternative keep their current route.
fn reroute_around_congestion(
    network: &SimRoadNetwork,
    agents: &mut BTreeMap<AgentId, SimAgent>,
    predictions: &BTreeMap<RoadId, Prediction>,
    limit: Option<usize>,
) -> usize {
    let congested = congested_roads(predictions);
    if congested.is_empty() {
        return 0;
    }

    let candidates: Vec<AgentId> = agents
        .values()
        .filter(|agent| !agent.has_reached_destination)
        .filter(|agent| {
            agent
                .upcoming_roads()
                .iter()
                .any(|road_id| congested.contains(road_id))
        })
        .map(|agent| agent.id)
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    let mut rerouted = 0;
    for agent_id in candidates {
        let Some(agent) = agents.get_mut(&agent_id) else {
            continue;
        };
        let Some(from) = agent.replan_origin(network) else {
            continue;
        };
        let Some(path) = congestion_free_path(network, from, agent.destination, &congested) else {
            continue;
        };
        let saved =
            route_travel_time(network, agent.upcoming_roads()) - route_travel_time(network, &path);
        agent.replace_upcoming_route(path, saved);
        rerouted += 1;
        debug!("Rerouted {} around congestion toward {}", agent_id, agent.destination);
    }
    rerouted
}

/// Put every in-flight agent back on the plain shortest route
fn reroute_shortest(network: &SimRoadNetwork, agents: &mut BTreeMap<AgentId, SimAgent>) -> usize {
    let mut rerouted = 0;
    for agent in agents.values_mut() {
        let Some(from) = agent.replan_origin(network) else {
            continue;
        };
        let path = network.shortest_path(from, agent.destination);
        if path.is_empty() || path.as_slice() == agent.upcoming_roads() {
            continue;
        }
        let saved =
            route_travel_time(network, agent.upcoming_roads()) - route_travel_time(network, &path);
        agent.replace_upcoming_route(path, saved);
        rerouted += 1;
    }
    rerouted
}
