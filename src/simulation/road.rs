//! Directed road segments and their derived congestion state

use super::types::{CongestionLevel, Direction, IntersectionId, Position, RoadId};

/// Densities are capped here so they can be read as a 0-100 scale
pub const MAX_DENSITY: f32 = 100.0;

/// A directed road connecting two intersections
///
/// Bidirectional streets are two opposing roads sharing endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct SimRoad {
    pub id: RoadId,
    pub start_intersection: IntersectionId,
    pub end_intersection: IntersectionId,
    pub direction: Direction,
    pub lanes: u32,
    /// Length in meters
    pub length: f32,
    /// Speed limit in km/h
    pub speed_limit: f32,
    /// Polyline from start to end, at least two points
    pub waypoints: Vec<Position>,

    /// Agents on this road as of the last recompute
    pub agent_count: usize,
    /// Agents per km per lane, capped at `MAX_DENSITY`
    pub current_density: f32,
    /// Speed traffic flows at, km/h
    pub current_speed: f32,
    pub congestion_level: CongestionLevel,
    /// Density floor imposed by a live traffic feed
    pub live_density: Option<f32>,
}

impl SimRoad {
    pub fn new(
        id: RoadId,
        start_intersection: IntersectionId,
        end_intersection: IntersectionId,
        waypoints: Vec<Position>,
        lanes: u32,
        speed_limit: f32,
    ) -> Self {
        let length = polyline_length(&waypoints);
        let direction = match (waypoints.first(), waypoints.last()) {
            (Some(first), Some(last)) => Direction::between(first, last),
            _ => Direction::East,
        };

        Self {
            id,
            start_intersection,
            end_intersection,
            direction,
            lanes: lanes.max(1),
            length,
            speed_limit,
            waypoints,
            agent_count: 0,
            current_density: 0.0,
            current_speed: speed_limit,
            congestion_level: CongestionLevel::Free,
            live_density: None,
        }
    }

    /// Recompute density, level and speed from this tick's agent count
    pub fn apply_agent_count(&mut self, count: usize) {
        self.agent_count = count;
        let length_km = (self.length / 1000.0).max(0.001);
        let counted = count as f32 / (length_km * self.lanes as f32);
        let density = match self.live_density {
            Some(live) => counted.max(live),
            None => counted,
        };
        self.current_density = density.clamp(0.0, MAX_DENSITY);
        self.congestion_level = CongestionLevel::from_density(self.current_density);
        self.current_speed = self.speed_limit * self.congestion_level.speed_factor();
    }

    /// Point at `distance` meters along the waypoint polyline
    pub fn point_at(&self, distance: f32) -> Position {
        let mut remaining = distance.max(0.0);
        for pair in self.waypoints.windows(2) {
            let segment = pair[0].distance(&pair[1]);
            if remaining <= segment {
                if segment <= f32::EPSILON {
                    return pair[0];
                }
                return pair[0].lerp(&pair[1], remaining / segment);
            }
            remaining -= segment;
        }
        self.waypoints.last().copied().unwrap_or_default()
    }

    /// Estimated seconds to traverse the road at its current speed
    pub fn travel_time(&self) -> f32 {
        let speed_ms = (self.current_speed / 3.6).max(0.1);
        self.length / speed_ms
    }
}

fn polyline_length(points: &[Position]) -> f32 {
    points
        .windows(2)
        .map(|pair| pair[0].distance(&pair[1]))
        .sum()
}
