//! Road network graph
//!
//! Owns intersections and directed roads, keeps the petgraph adjacency used
//! for pathfinding, and tracks where every agent is so congestion and local
//! interaction queries can be answered.

use anyhow::{anyhow, bail, ensure, Context, Result};
use ordered_float::OrderedFloat;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use super::config::{GridConfig, LightTimings};
use super::intersection::SimIntersection;
use super::pathfinding;
use super::road::SimRoad;
use super::types::{AgentId, CongestionLevel, Direction, IntersectionId, Position, RoadId, SimId};

/// Edge data for the road network graph
#[derive(Debug, Clone, Copy)]
pub struct RoadEdge {
    pub road_id: RoadId,
}

/// Where an agent was after its last update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentMarker {
    pub id: AgentId,
    pub road: Option<RoadId>,
    pub distance_along_road: f32,
    /// km/h
    pub speed: f32,
    pub position: Position,
}

/// Number of roads at each congestion level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CongestionCounts {
    pub free: usize,
    pub moderate: usize,
    pub heavy: usize,
    pub gridlock: usize,
}

/// Road network graph with intersections, roads and agent tracking
#[derive(Debug, Clone, Default)]
pub struct SimRoadNetwork {
    /// The underlying petgraph directed graph (one-way roads)
    graph: DiGraph<IntersectionId, RoadEdge>,

    /// Maps intersection IDs to their node indices in the graph
    intersection_to_node: BTreeMap<IntersectionId, NodeIndex>,

    intersections: BTreeMap<IntersectionId, SimIntersection>,

    roads: BTreeMap<RoadId, SimRoad>,

    /// Last reported location of every active agent
    agent_markers: BTreeMap<AgentId, AgentMarker>,

    /// Agents on each road ordered by distance along it; the id breaks ties
    agents_on_roads: BTreeMap<RoadId, BTreeSet<(OrderedFloat<f32>, AgentId)>>,

    /// Grid cell lookup when built with `from_grid`
    grid_index: BTreeMap<(usize, usize), IntersectionId>,
    grid_dims: Option<(usize, usize)>,

    light_timings: LightTimings,

    next_id: usize,
}

impl SimRoadNetwork {
    pub fn new(light_timings: LightTimings) -> Self {
        Self {
            light_timings,
            ..Self::default()
        }
    }

    /// Build a rows x cols grid with two-way roads between neighbours and
    /// four lights at every signalized intersection
    pub fn from_grid(grid: &GridConfig, light_timings: LightTimings) -> Result<Self> {
        ensure!(
            grid.rows > 0 && grid.cols > 0,
            "Grid must have at least one row and column"
        );

        let mut network = Self::new(light_timings);

        for row in 0..grid.rows {
            for col in 0..grid.cols {
                let position = Position::new(col as f32 * grid.spacing, row as f32 * grid.spacing);
                let signalized = !grid.unsignalized.contains(&(row, col));
                let id = network.add_intersection(position, signalized);
                network.grid_index.insert((row, col), id);
            }
        }

        for row in 0..grid.rows {
            for col in 0..grid.cols {
                let here = network.intersection_at(row, col)?;
                if col + 1 < grid.cols {
                    let east = network.intersection_at(row, col + 1)?;
                    network.add_two_way_road(here, east, grid.lanes, grid.speed_limit)?;
                }
                if row + 1 < grid.rows {
                    let north = network.intersection_at(row + 1, col)?;
                    network.add_two_way_road(here, north, grid.lanes, grid.speed_limit)?;
                }
            }
        }

        network.grid_dims = Some((grid.rows, grid.cols));
        Ok(network)
    }

    fn next_sim_id(&mut self) -> SimId {
        let id = SimId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Adds an intersection to the network graph
    pub fn add_intersection(&mut self, position: Position, signalized: bool) -> IntersectionId {
        let id = IntersectionId(self.next_sim_id());
        let mut intersection = SimIntersection::new(id, position);
        if signalized {
            let first_light = self.next_id;
            self.next_id += Direction::ALL.len();
            intersection.install_lights(first_light, &self.light_timings);
        }

        let node_index = self.graph.add_node(id);
        self.intersection_to_node.insert(id, node_index);
        self.intersections.insert(id, intersection);
        id
    }

    /// Adds a straight road between two intersections
    pub fn add_road(
        &mut self,
        start: IntersectionId,
        end: IntersectionId,
        lanes: u32,
        speed_limit: f32,
    ) -> Result<RoadId> {
        self.add_road_with_waypoints(start, end, Vec::new(), lanes, speed_limit)
    }

    /// Adds a road following `via` between the two intersection positions
    pub fn add_road_with_waypoints(
        &mut self,
        start: IntersectionId,
        end: IntersectionId,
        via: Vec<Position>,
        lanes: u32,
        speed_limit: f32,
    ) -> Result<RoadId> {
        ensure!(start != end, "Road cannot start and end at {}", start);

        let start_pos = self.intersection(start)?.position;
        let end_pos = self.intersection(end)?.position;
        let start_node = *self
            .intersection_to_node
            .get(&start)
            .context("Start intersection not found in graph")?;
        let end_node = *self
            .intersection_to_node
            .get(&end)
            .context("End intersection not found in graph")?;

        let mut waypoints = Vec::with_capacity(via.len() + 2);
        waypoints.push(start_pos);
        waypoints.extend(via);
        waypoints.push(end_pos);

        let id = RoadId(self.next_sim_id());
        let road = SimRoad::new(id, start, end, waypoints, lanes, speed_limit);

        self.graph.add_edge(start_node, end_node, RoadEdge { road_id: id });
        self.roads.insert(id, road);

        for endpoint in [start, end] {
            if let Some(intersection) = self.intersections.get_mut(&endpoint) {
                intersection.connected_roads.push(id);
            }
        }

        Ok(id)
    }

    /// Add a two-way street (creates two opposing roads)
    pub fn add_two_way_road(
        &mut self,
        a: IntersectionId,
        b: IntersectionId,
        lanes: u32,
        speed_limit: f32,
    ) -> Result<(RoadId, RoadId)> {
        let forward = self.add_road(a, b, lanes, speed_limit)?;
        let backward = self.add_road(b, a, lanes, speed_limit)?;
        Ok((forward, backward))
    }

    /// Intersection at a grid cell
    pub fn intersection_at(&self, row: usize, col: usize) -> Result<IntersectionId> {
        self.grid_index
            .get(&(row, col))
            .copied()
            .ok_or_else(|| anyhow!("Grid cell ({}, {}) not found", row, col))
    }

    pub fn grid_dims(&self) -> Option<(usize, usize)> {
        self.grid_dims
    }

    /// Middle row of the grid from west to east
    pub fn default_corridor(&self) -> Vec<IntersectionId> {
        match self.grid_dims {
            Some((rows, cols)) => (0..cols)
                .filter_map(|col| self.grid_index.get(&(rows / 2, col)).copied())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn intersection(&self, id: IntersectionId) -> Result<&SimIntersection> {
        self.intersections
            .get(&id)
            .ok_or_else(|| anyhow!("Intersection {} not found", id))
    }

    pub fn intersection_mut(&mut self, id: IntersectionId) -> Result<&mut SimIntersection> {
        self.intersections
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Intersection {} not found", id))
    }

    pub fn road(&self, id: RoadId) -> Result<&SimRoad> {
        self.roads
            .get(&id)
            .ok_or_else(|| anyhow!("Road {} not found", id))
    }

    pub fn road_mut(&mut self, id: RoadId) -> Result<&mut SimRoad> {
        self.roads
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Road {} not found", id))
    }

    pub fn roads(&self) -> &BTreeMap<RoadId, SimRoad> {
        &self.roads
    }

    pub fn intersections(&self) -> &BTreeMap<IntersectionId, SimIntersection> {
        &self.intersections
    }

    pub fn intersection_ids(&self) -> Vec<IntersectionId> {
        self.intersections.keys().copied().collect()
    }

    pub fn road_count(&self) -> usize {
        self.roads.len()
    }

    pub fn intersection_count(&self) -> usize {
        self.intersections.len()
    }

    /// Finds the road connecting two intersections
    pub fn find_road_between(&self, from: IntersectionId, to: IntersectionId) -> Result<RoadId> {
        let from_node = self
            .intersection_to_node
            .get(&from)
            .ok_or_else(|| anyhow!("Intersection {} not found", from))?;
        let to_node = self
            .intersection_to_node
            .get(&to)
            .ok_or_else(|| anyhow!("Intersection {} not found", to))?;

        self.graph
            .edges(*from_node)
            .find(|edge| edge.target() == *to_node)
            .map(|edge| edge.weight().road_id)
            .ok_or_else(|| anyhow!("No road found connecting {} to {}", from, to))
    }

    /// Outgoing roads of an intersection with the intersection each leads to
    pub fn outgoing_roads(&self, id: IntersectionId) -> Option<Vec<(RoadId, IntersectionId)>> {
        let node_index = self.intersection_to_node.get(&id)?;
        let connections = self
            .graph
            .edges(*node_index)
            .map(|edge| (edge.weight().road_id, self.graph[edge.target()]))
            .collect();
        Some(connections)
    }

    /// Fewest-roads route from `start` to `end`; empty when unreachable or `start == end`
    pub fn shortest_path(&self, start: IntersectionId, end: IntersectionId) -> Vec<RoadId> {
        pathfinding::shortest_path(self, start, end)
    }

    /// Like `shortest_path` but never uses a road in `avoid`
    pub fn shortest_path_avoiding(
        &self,
        start: IntersectionId,
        end: IntersectionId,
        avoid: &BTreeSet<RoadId>,
    ) -> Vec<RoadId> {
        pathfinding::shortest_path_avoiding(self, start, end, avoid)
    }

    /// Roads ending at `intersection` whose heading is `direction`
    pub fn roads_into(&self, intersection: IntersectionId, direction: Direction) -> Vec<RoadId> {
        self.roads
            .values()
            .filter(|road| road.end_intersection == intersection && road.direction == direction)
            .map(|road| road.id)
            .collect()
    }

    /// Other roads sharing an endpoint with `road_id`
    pub fn neighbor_roads(&self, road_id: RoadId) -> Result<Vec<RoadId>> {
        let road = self.road(road_id)?;
        let endpoints = [road.start_intersection, road.end_intersection];
        Ok(self
            .roads
            .values()
            .filter(|other| other.id != road_id)
            .filter(|other| {
                endpoints.contains(&other.start_intersection)
                    || endpoints.contains(&other.end_intersection)
            })
            .map(|other| other.id)
            .collect())
    }

    /// Record where an agent is after its update
    pub fn track_agent(&mut self, marker: AgentMarker) {
        if let Some(previous) = self.agent_markers.insert(marker.id, marker) {
            self.remove_from_road_index(&previous);
        }
        if let Some(road_id) = marker.road {
            self.agents_on_roads
                .entry(road_id)
                .or_default()
                .insert((OrderedFloat(marker.distance_along_road), marker.id));
        }
    }

    /// Stop tracking an agent and drop it from every queue
    pub fn untrack_agent(&mut self, agent_id: AgentId) {
        if let Some(previous) = self.agent_markers.remove(&agent_id) {
            self.remove_from_road_index(&previous);
        }
        for intersection in self.intersections.values_mut() {
            intersection.dequeue(agent_id);
        }
    }

    fn remove_from_road_index(&mut self, marker: &AgentMarker) {
        let Some(road_id) = marker.road else {
            return;
        };
        if let Some(on_road) = self.agents_on_roads.get_mut(&road_id) {
            on_road.remove(&(OrderedFloat(marker.distance_along_road), marker.id));
            if on_road.is_empty() {
                self.agents_on_roads.remove(&road_id);
            }
        }
    }

    pub fn agent_marker(&self, agent_id: AgentId) -> Option<&AgentMarker> {
        self.agent_markers.get(&agent_id)
    }

    /// Agents on `road_id` strictly past `distance` and at most `range`
    /// meters further along, closest first
    pub fn agents_ahead(&self, road_id: RoadId, distance: f32, range: f32) -> Vec<AgentMarker> {
        let Some(on_road) = self.agents_on_roads.get(&road_id) else {
            return Vec::new();
        };
        let after = (OrderedFloat(distance), AgentId(SimId(usize::MAX)));
        on_road
            .range((Bound::Excluded(after), Bound::Unbounded))
            .take_while(|(ahead, _)| ahead.0 <= distance + range)
            .filter_map(|(_, id)| self.agent_markers.get(id).copied())
            .collect()
    }

    /// Tracked agents within `radius` meters of `position`, nearest first
    pub fn agents_near(&self, position: &Position, radius: f32) -> Vec<AgentMarker> {
        let mut nearby: Vec<AgentMarker> = self
            .agent_markers
            .values()
            .filter(|marker| marker.position.distance(position) <= radius)
            .copied()
            .collect();
        nearby.sort_by_key(|marker| (OrderedFloat(marker.position.distance(position)), marker.id));
        nearby
    }

    /// Number of tracked agents currently on a road
    pub fn agents_on_road(&self, road_id: RoadId) -> usize {
        self.agents_on_roads.get(&road_id).map_or(0, BTreeSet::len)
    }

    /// Recount agents per road and refresh every road's derived state
    pub fn recompute_congestion(&mut self) {
        for road in self.roads.values_mut() {
            let count = self.agents_on_roads.get(&road.id).map_or(0, BTreeSet::len);
            road.apply_agent_count(count);
        }
    }

    /// Impose (or clear) a density floor from a live traffic feed.
    /// Takes effect immediately and on every later recompute.
    pub fn set_live_density(&mut self, road_id: RoadId, density: Option<f32>) -> Result<()> {
        if let Some(value) = density {
            if !value.is_finite() || value < 0.0 {
                bail!("Live density for {} must be a non-negative number, got {}", road_id, value);
            }
        }
        let count = self.agents_on_road(road_id);
        let road = self.road_mut(road_id)?;
        road.live_density = density;
        road.apply_agent_count(count);
        Ok(())
    }

    pub fn congestion_counts(&self) -> CongestionCounts {
        let mut counts = CongestionCounts::default();
        for road in self.roads.values() {
            match road.congestion_level {
                CongestionLevel::Free => counts.free += 1,
                CongestionLevel::Moderate => counts.moderate += 1,
                CongestionLevel::Heavy => counts.heavy += 1,
                CongestionLevel::Gridlock => counts.gridlock += 1,
            }
        }
        counts
    }

    /// Advance every signalized light
    pub fn update_lights(&mut self, delta_secs: f32) {
        for intersection in self.intersections.values_mut() {
            intersection.update_lights(delta_secs);
        }
    }

    pub fn total_queued(&self) -> usize {
        self.intersections
            .values()
            .map(SimIntersection::total_queued)
            .sum()
    }

    /// Forget every agent and restore lights, leaving the graph intact
    pub fn reset_dynamic_state(&mut self) {
        self.agent_markers.clear();
        self.agents_on_roads.clear();
        let timings = self.light_timings;
        for intersection in self.intersections.values_mut() {
            intersection.clear_queues();
            intersection.reset_lights(&timings);
        }
        for road in self.roads.values_mut() {
            road.apply_agent_count(0);
        }
    }
}
