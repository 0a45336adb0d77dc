//! Intersection logic for the traffic simulation
//!
//! An intersection arbitrates right-of-way per heading. Queueing is driven by
//! the agents themselves: they join the queue for their heading while held at
//! a red light and leave it when they start moving again. The intersection
//! never evicts anyone on its own.

use std::collections::{BTreeMap, VecDeque};

use super::config::LightTimings;
use super::traffic_light::{LightState, TrafficLight};
use super::types::{AgentId, Direction, IntersectionId, LightId, Position, RoadId, SimId};

/// Seconds each queued agent is assumed to add to the wait
pub const WAIT_PER_QUEUED_AGENT: f32 = 3.0;

/// An intersection in the traffic simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimIntersection {
    pub id: IntersectionId,
    pub position: Position,
    /// Roads starting or ending here
    pub connected_roads: Vec<RoadId>,
    /// False for stop-sign style junctions that always let agents through
    pub signalized: bool,
    lights: BTreeMap<Direction, TrafficLight>,
    queues: BTreeMap<Direction, VecDeque<AgentId>>,
}

/// Phase a light starts in: east-west flows first
pub fn initial_light_state(direction: Direction) -> LightState {
    if direction.is_east_west() {
        LightState::Green
    } else {
        LightState::Red
    }
}

impl SimIntersection {
    pub fn new(id: IntersectionId, position: Position) -> Self {
        Self {
            id,
            position,
            connected_roads: Vec::new(),
            signalized: false,
            lights: BTreeMap::new(),
            queues: Direction::ALL
                .iter()
                .map(|direction| (*direction, VecDeque::new()))
                .collect(),
        }
    }

    /// Install one light per cardinal heading.
    /// `first_light_id` is the id of the NORTH light; the rest follow in `Direction::ALL` order.
    pub fn install_lights(&mut self, first_light_id: usize, timings: &LightTimings) {
        self.signalized = true;
        self.lights.clear();
        for (offset, direction) in Direction::ALL.iter().enumerate() {
            let light = TrafficLight::new(
                LightId(SimId(first_light_id + offset)),
                self.id,
                *direction,
                initial_light_state(*direction),
                timings,
            );
            self.lights.insert(*direction, light);
        }
    }

    /// The light governing a heading, if this intersection is signalized
    pub fn light(&self, direction: Direction) -> Option<&TrafficLight> {
        self.lights.get(&direction)
    }

    pub fn light_mut(&mut self, direction: Direction) -> Option<&mut TrafficLight> {
        self.lights.get_mut(&direction)
    }

    pub fn lights(&self) -> impl Iterator<Item = &TrafficLight> {
        self.lights.values()
    }

    pub fn lights_mut(&mut self) -> impl Iterator<Item = &mut TrafficLight> {
        self.lights.values_mut()
    }

    /// Whether an agent heading in `direction` may enter
    pub fn can_pass(&self, direction: Direction) -> bool {
        if !self.signalized {
            return true;
        }
        match self.lights.get(&direction) {
            Some(light) => light.is_green(),
            None => true,
        }
    }

    /// Add an agent to the queue for its heading.
    /// An agent is in at most one queue, so it is removed from any other first.
    pub fn enqueue(&mut self, direction: Direction, agent_id: AgentId) {
        if self
            .queues
            .get(&direction)
            .is_some_and(|queue| queue.contains(&agent_id))
        {
            return;
        }
        self.dequeue(agent_id);
        self.queues.entry(direction).or_default().push_back(agent_id);
    }

    /// Remove an agent from whichever queue holds it.
    /// Returns true if it was queued.
    pub fn dequeue(&mut self, agent_id: AgentId) -> bool {
        let mut removed = false;
        for queue in self.queues.values_mut() {
            let before = queue.len();
            queue.retain(|queued| *queued != agent_id);
            removed |= queue.len() != before;
        }
        removed
    }

    pub fn queue(&self, direction: Direction) -> impl Iterator<Item = &AgentId> {
        self.queues.get(&direction).into_iter().flatten()
    }

    pub fn queue_len(&self, direction: Direction) -> usize {
        self.queues.get(&direction).map_or(0, VecDeque::len)
    }

    pub fn total_queued(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Heading with the longest queue; ties go to the first in `Direction::ALL`
    pub fn longest_queue(&self) -> Option<(Direction, usize)> {
        let mut best: Option<(Direction, usize)> = None;
        for direction in Direction::ALL {
            let len = self.queue_len(direction);
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((direction, len));
            }
        }
        best
    }

    /// Rough estimate of how long a newly arriving agent waits.
    /// This is a fixed per-agent approximation, not a schedule.
    pub fn average_wait_time(&self) -> f32 {
        self.total_queued() as f32 * WAIT_PER_QUEUED_AGENT
    }

    /// Advance every light by the elapsed time
    pub fn update_lights(&mut self, delta_secs: f32) {
        if !self.signalized {
            return;
        }
        for light in self.lights.values_mut() {
            light.update(delta_secs);
        }
    }

    pub fn clear_queues(&mut self) {
        for queue in self.queues.values_mut() {
            queue.clear();
        }
    }

    /// Restore every light to its initial phase and durations
    pub fn reset_lights(&mut self, timings: &LightTimings) {
        for (direction, light) in self.lights.iter_mut() {
            light.reset(initial_light_state(*direction), timings);
        }
    }
}
