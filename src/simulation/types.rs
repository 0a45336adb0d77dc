//! Core types for the traffic simulation
//!
//! Identifiers, geometry and the small enums shared by every component.

use serde::Serialize;
use std::fmt;

/// A unique identifier for simulation entities
/// This is a simple wrapper around a usize for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SimId(pub usize);

/// A wrapper type for intersection IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct IntersectionId(pub SimId);

/// A wrapper type for road IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RoadId(pub SimId);

/// A wrapper type for agent IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AgentId(pub SimId);

/// A wrapper type for traffic light IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LightId(pub SimId);

/// A wrapper type for hazard IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HazardId(pub usize);

impl fmt::Display for IntersectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I{}", self.0 .0)
    }
}

impl fmt::Display for RoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0 .0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0 .0)
    }
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0 .0)
    }
}

/// A 2D position in the simulation
///
/// Used for map coordinates and rendering coordinates alike; nothing in the
/// simulation assumes a particular coordinate system. `+y` is north.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(&self, other: &Position, t: f32) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Angle in radians from this position to another, measured from +x
    pub fn angle_to(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx == 0.0 && dy == 0.0 {
            0.0
        } else {
            dy.atan2(dx)
        }
    }
}

/// Cardinal heading of a road, also used to key lights and queues
///
/// Lights and queues at an intersection are keyed by the travel heading of
/// the approaching road: eastbound agents obey the EAST light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// Heading of travel from `from` to `to`, picking the dominant axis
    pub fn between(from: &Position, to: &Position) -> Direction {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        if dx.abs() >= dy.abs() {
            if dx >= 0.0 {
                Direction::East
            } else {
                Direction::West
            }
        } else if dy >= 0.0 {
            Direction::North
        } else {
            Direction::South
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    pub fn is_east_west(self) -> bool {
        matches!(self, Direction::East | Direction::West)
    }
}

/// Coarse congestion classification of a road
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CongestionLevel {
    Free,
    Moderate,
    Heavy,
    Gridlock,
}

/// Density at or above which a road is MODERATE
pub const MODERATE_DENSITY: f32 = 10.0;

/// Density at or above which a road is HEAVY
pub const HEAVY_DENSITY: f32 = 25.0;

/// Density at or above which a road is GRIDLOCK
pub const GRIDLOCK_DENSITY: f32 = 45.0;

impl CongestionLevel {
    /// Classify a density (agents per km per lane)
    pub fn from_density(density: f32) -> Self {
        if density < MODERATE_DENSITY {
            CongestionLevel::Free
        } else if density < HEAVY_DENSITY {
            CongestionLevel::Moderate
        } else if density < GRIDLOCK_DENSITY {
            CongestionLevel::Heavy
        } else {
            CongestionLevel::Gridlock
        }
    }

    /// Fraction of the speed limit traffic flows at on this level
    pub fn speed_factor(self) -> f32 {
        match self {
            CongestionLevel::Free => 1.0,
            CongestionLevel::Moderate => 0.7,
            CongestionLevel::Heavy => 0.4,
            CongestionLevel::Gridlock => 0.1,
        }
    }
}

/// Convert km/h to m/s
pub fn kmh_to_ms(speed: f32) -> f32 {
    speed / 3.6
}
