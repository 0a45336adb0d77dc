//! Traffic light state machine
//!
//! Lights cycle RED -> GREEN -> YELLOW -> RED with an independent countdown.
//! Target durations may be changed at any time; a new value only takes effect
//! the next time the light enters that phase.

use serde::Serialize;

use super::config::LightTimings;
use super::types::{Direction, IntersectionId, LightId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LightState {
    Red,
    Yellow,
    Green,
}

impl LightState {
    pub fn next(self) -> LightState {
        match self {
            LightState::Red => LightState::Green,
            LightState::Green => LightState::Yellow,
            LightState::Yellow => LightState::Red,
        }
    }
}

/// A traffic light governing one heading at an intersection
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficLight {
    pub id: LightId,
    pub intersection: IntersectionId,
    pub direction: Direction,
    state: LightState,
    remaining_time: f32,
    green_duration: f32,
    yellow_duration: f32,
    red_duration: f32,
}

impl TrafficLight {
    pub fn new(
        id: LightId,
        intersection: IntersectionId,
        direction: Direction,
        initial_state: LightState,
        timings: &LightTimings,
    ) -> Self {
        let mut light = Self {
            id,
            intersection,
            direction,
            state: initial_state,
            remaining_time: 0.0,
            green_duration: timings.green,
            yellow_duration: timings.yellow,
            red_duration: timings.red,
        };
        light.remaining_time = light.duration_of(initial_state);
        light
    }

    pub fn state(&self) -> LightState {
        self.state
    }

    pub fn remaining_time(&self) -> f32 {
        self.remaining_time
    }

    pub fn green_duration(&self) -> f32 {
        self.green_duration
    }

    pub fn yellow_duration(&self) -> f32 {
        self.yellow_duration
    }

    pub fn red_duration(&self) -> f32 {
        self.red_duration
    }

    pub fn is_green(&self) -> bool {
        self.state == LightState::Green
    }

    /// Target duration for the given phase
    pub fn duration_of(&self, state: LightState) -> f32 {
        match state {
            LightState::Red => self.red_duration,
            LightState::Yellow => self.yellow_duration,
            LightState::Green => self.green_duration,
        }
    }

    /// Set the length of future green phases; the current phase is unaffected
    pub fn set_green_duration(&mut self, seconds: f32) {
        self.green_duration = seconds.max(0.1);
    }

    /// Set the length of future red phases; the current phase is unaffected
    pub fn set_red_duration(&mut self, seconds: f32) {
        self.red_duration = seconds.max(0.1);
    }

    /// Overwrite the countdown of the phase in progress.
    ///
    /// This can truncate or extend the current phase. Green-wave coordination
    /// relies on it.
    pub fn override_remaining_time(&mut self, seconds: f32) {
        self.remaining_time = seconds;
    }

    /// Advance the countdown, transitioning at most once.
    /// Returns true if the light changed state.
    pub fn update(&mut self, delta_secs: f32) -> bool {
        self.remaining_time -= delta_secs;
        if self.remaining_time > 0.0 {
            return false;
        }
        self.state = self.state.next();
        self.remaining_time = self.duration_of(self.state);
        true
    }

    /// Restore phase and durations to a fresh light
    pub fn reset(&mut self, initial_state: LightState, timings: &LightTimings) {
        self.state = initial_state;
        self.green_duration = timings.green;
        self.yellow_duration = timings.yellow;
        self.red_duration = timings.red;
        self.remaining_time = self.duration_of(initial_state);
    }
}
