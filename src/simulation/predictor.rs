//! Short-horizon congestion forecasting
//!
//! A rule-based stand-in for a learned model. Each road keeps a bounded
//! history of density samples; forecasts extrapolate the history trend and
//! add neighbour and queue pressure with weights that grow with the horizon.
//! Everything here is a deterministic function of history and topology.

use std::collections::{BTreeMap, VecDeque};

use super::road_network::SimRoadNetwork;
use super::types::RoadId;

/// Samples kept per road; the oldest is evicted first
pub const HISTORY_CAPACITY: usize = 30;

/// Forecast horizons in seconds
pub const HORIZONS: [f32; 3] = [10.0, 20.0, 30.0];

/// (neighbour weight, queue weight) per horizon, same order as `HORIZONS`
const HORIZON_WEIGHTS: [(f32, f32); 3] = [(0.3, 0.2), (0.5, 0.4), (0.7, 0.6)];

const QUEUE_PRESSURE_PER_AGENT: f32 = 2.0;
const MIN_SAMPLES_FOR_TREND: usize = 3;
const MIN_SAMPLES_FOR_CONFIDENCE: usize = 5;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const MIN_CONFIDENCE: f32 = 0.3;
const MAX_CONFIDENCE: f32 = 1.0;
const MAX_FORECAST: f32 = 100.0;

/// Forecast for one road
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub road_id: RoadId,
    pub current_density: f32,
    pub forecast_10s: f32,
    pub forecast_20s: f32,
    pub forecast_30s: f32,
    /// In [0.3, 1.0]; higher when history has been stable
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct CongestionPredictor {
    history: BTreeMap<RoadId, VecDeque<f32>>,
}

impl CongestionPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every road's current density to its history
    pub fn record(&mut self, network: &SimRoadNetwork) {
        for road in network.roads().values() {
            let samples = self.history.entry(road.id).or_default();
            if samples.len() == HISTORY_CAPACITY {
                samples.pop_front();
            }
            samples.push_back(road.current_density);
        }
    }

    pub fn history(&self, road_id: RoadId) -> Option<&VecDeque<f32>> {
        self.history.get(&road_id)
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Forecast every road. Does not touch the history.
    pub fn predict(&self, network: &SimRoadNetwork) -> BTreeMap<RoadId, Prediction> {
        network
            .roads()
            .keys()
            .filter_map(|road_id| {
                self.predict_road(network, *road_id)
                    .map(|prediction| (*road_id, prediction))
            })
            .collect()
    }

    /// Forecast a single road; `None` if the road does not exist
    pub fn predict_road(&self, network: &SimRoadNetwork, road_id: RoadId) -> Option<Prediction> {
        let road = network.road(road_id).ok()?;
        let current = road.current_density;

        let samples: Vec<f32> = self
            .history
            .get(&road_id)
            .map(|history| history.iter().copied().collect())
            .unwrap_or_default();

        let trend = if samples.len() < MIN_SAMPLES_FOR_TREND {
            0.0
        } else {
            least_squares_slope(&samples)
        };

        let neighbors = network.neighbor_roads(road_id).unwrap_or_default();
        let neighbor_influence = if neighbors.is_empty() {
            0.0
        } else {
            let total: f32 = neighbors
                .iter()
                .filter_map(|id| network.road(*id).ok())
                .map(|neighbor| neighbor.current_density)
                .sum();
            total / neighbors.len() as f32
        };

        let queue_length = network
            .intersection(road.end_intersection)
            .map(|intersection| intersection.queue_len(road.direction))
            .unwrap_or(0);
        let queue_influence = QUEUE_PRESSURE_PER_AGENT * queue_length as f32;

        let forecast = |index: usize| {
            let horizon = HORIZONS[index];
            let (neighbor_weight, queue_weight) = HORIZON_WEIGHTS[index];
            (current
                + trend * horizon
                + neighbor_influence * neighbor_weight
                + queue_influence * queue_weight)
                .clamp(0.0, MAX_FORECAST)
        };

        let confidence = if samples.len() < MIN_SAMPLES_FOR_CONFIDENCE {
            DEFAULT_CONFIDENCE
        } else {
            (1.0 / (1.0 + variance(&samples) / 10.0)).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
        };

        Some(Prediction {
            road_id,
            current_density: current,
            forecast_10s: forecast(0),
            forecast_20s: forecast(1),
            forecast_30s: forecast(2),
            confidence,
        })
    }
}

/// Slope of the least-squares line through (index, value)
fn least_squares_slope(samples: &[f32]) -> f32 {
    let n = samples.len() as f32;
    if samples.len() < 2 {
        return 0.0;
    }
    let sum_x: f32 = (0..samples.len()).map(|i| i as f32).sum();
    let sum_y: f32 = samples.iter().sum();
    let sum_xy: f32 = samples
        .iter()
        .enumerate()
        .map(|(i, y)| i as f32 * y)
        .sum();
    let sum_xx: f32 = (0..samples.len()).map(|i| (i * i) as f32).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        0.0
    } else {
        (n * sum_xy - sum_x * sum_y) / denominator
    }
}

/// Population variance
fn variance(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    samples.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n
}
