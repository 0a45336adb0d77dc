//! Agent behavior profiles
//!
//! Every agent shares the same kinematics and queueing. Profiles only change
//! the coefficients: speed bounds, hazard sensitivity and how quickly stress
//! and fatigue build up.

use serde::Serialize;

/// Kind of simulated entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AgentProfile {
    /// Generic car from the grid simulation
    Vehicle,
    DeliveryRider,
    Commuter,
    EBike,
    Scooter,
    PersonalMotorcycle,
}

/// Numeric coefficients for a profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileCoefficients {
    /// Lower bound of the randomly drawn max speed, km/h
    pub min_speed: f32,
    /// Upper bound of the randomly drawn max speed, km/h
    pub max_speed: f32,
    /// Multiplier on hazard penalties
    pub hazard_sensitivity: f32,
    /// Stress gained per second spent waiting
    pub stress_rate: f32,
    /// Fatigue gained per second on the road
    pub fatigue_rate: f32,
}

impl AgentProfile {
    pub fn coefficients(self) -> ProfileCoefficients {
        match self {
            AgentProfile::Vehicle => ProfileCoefficients {
                min_speed: 40.0,
                max_speed: 60.0,
                hazard_sensitivity: 0.0,
                stress_rate: 0.0,
                fatigue_rate: 0.0,
            },
            AgentProfile::DeliveryRider => ProfileCoefficients {
                min_speed: 30.0,
                max_speed: 50.0,
                hazard_sensitivity: 1.2,
                stress_rate: 1.5,
                fatigue_rate: 0.08,
            },
            AgentProfile::Commuter => ProfileCoefficients {
                min_speed: 35.0,
                max_speed: 55.0,
                hazard_sensitivity: 1.0,
                stress_rate: 1.0,
                fatigue_rate: 0.05,
            },
            AgentProfile::EBike => ProfileCoefficients {
                min_speed: 20.0,
                max_speed: 30.0,
                hazard_sensitivity: 1.5,
                stress_rate: 0.8,
                fatigue_rate: 0.04,
            },
            AgentProfile::Scooter => ProfileCoefficients {
                min_speed: 15.0,
                max_speed: 25.0,
                hazard_sensitivity: 1.8,
                stress_rate: 1.2,
                fatigue_rate: 0.06,
            },
            AgentProfile::PersonalMotorcycle => ProfileCoefficients {
                min_speed: 45.0,
                max_speed: 70.0,
                hazard_sensitivity: 0.9,
                stress_rate: 0.7,
                fatigue_rate: 0.03,
            },
        }
    }

    /// Riders track hazards, stress and fatigue; plain vehicles do not
    pub fn is_rider(self) -> bool {
        !matches!(self, AgentProfile::Vehicle)
    }
}
