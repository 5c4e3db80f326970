//! Frequency mapper: orbital distance to acoustic frequency.
//!
//! Mean frequencies follow Murch's modified Titius–Bode law
//! (`base * (1 + 2^n * 3)`) or a linear map of the measured distance.
//! The instantaneous frequency is modulated by `sqrt(a / r)`, so a body
//! sounds higher near perihelion where it also moves fastest.

use crate::bodies::{Body, DistanceModel};

/// Maps distances to frequencies for one base frequency and distance model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyMapper {
    pub base_frequency: f64,
    pub distance_model: DistanceModel,
}

impl FrequencyMapper {
    pub fn new(base_frequency: f64, distance_model: DistanceModel) -> Self {
        FrequencyMapper {
            base_frequency,
            distance_model,
        }
    }

    /// The unmodulated frequency of a body.
    pub fn mean_frequency(&self, body: &Body) -> f64 {
        match self.distance_model {
            DistanceModel::Theoretical => {
                self.base_frequency * (1.0 + 2.0_f64.powi(body.orbital_index) * 3.0)
            }
            DistanceModel::Actual => self.base_frequency * (5.0 * body.actual_distance + 1.0),
        }
    }

    /// Frequency at the current focus distance `r`.
    pub fn instantaneous_frequency(&self, body: &Body, distance: f64) -> f64 {
        let mean = self.mean_frequency(body);
        mean * distance_ratio(body.mean_distance(self.distance_model), distance).sqrt()
    }
}

/// `a / r`: above 1 inside the mean distance, below 1 outside it.
pub fn distance_ratio(mean_distance: f64, distance: f64) -> f64 {
    if distance > 0.0 {
        mean_distance / distance
    } else {
        1.0
    }
}
