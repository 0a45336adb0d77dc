//! Ambient hazards riders react to
//!
//! Hazards only feed rider statistics. They never block roads or change
//! intersection state.

use serde::Serialize;

use super::types::{HazardId, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HazardKind {
    Pothole,
    Debris,
    Construction,
    Flooding,
}

impl HazardKind {
    pub const ALL: [HazardKind; 4] = [
        HazardKind::Pothole,
        HazardKind::Debris,
        HazardKind::Construction,
        HazardKind::Flooding,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hazard {
    pub id: HazardId,
    pub kind: HazardKind,
    pub position: Position,
    /// 0.0 (harmless) to 1.0 (severe)
    pub severity: f32,
}

/// Supplies hazards around a position
pub trait HazardSource {
    fn hazards_near(&self, position: &Position, radius: f32) -> Vec<Hazard>;
}

/// Source with no hazards at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHazards;

impl HazardSource for NoHazards {
    fn hazards_near(&self, _position: &Position, _radius: f32) -> Vec<Hazard> {
        Vec::new()
    }
}

/// A fixed set of hazards
#[derive(Debug, Clone, Default)]
pub struct HazardField {
    hazards: Vec<Hazard>,
}

impl HazardField {
    pub fn new(hazards: Vec<Hazard>) -> Self {
        Self { hazards }
    }

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub fn len(&self) -> usize {
        self.hazards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hazards.is_empty()
    }
}

impl HazardSource for HazardField {
    fn hazards_near(&self, position: &Position, radius: f32) -> Vec<Hazard> {
        self.hazards
            .iter()
            .filter(|hazard| hazard.position.distance(position) <= radius)
            .copied()
            .collect()
    }
}
