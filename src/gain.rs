//! Gain safety model: frequency-dependent loudness protection.
//!
//! Lower frequencies get more gain, higher frequencies less, with an extra
//! roll-off above a cutoff and optional equal-loudness weighting.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Parameters of the gain curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainConfig {
    /// Frequency at which the base curve yields unity gain (Hz).
    #[serde(default = "GainConfig::default_reference_frequency")]
    pub reference_frequency: f64,
    #[serde(default = "GainConfig::default_scaling_factor")]
    pub scaling_factor: f64,
    #[serde(default = "GainConfig::default_minimum_gain")]
    pub minimum_gain: f64,
    #[serde(default = "GainConfig::default_maximum_gain")]
    pub maximum_gain: f64,
    #[serde(default = "GainConfig::default_high_frequency_cutoff")]
    pub high_frequency_cutoff: f64,
    #[serde(default = "GainConfig::default_high_frequency_scaling_factor")]
    pub high_frequency_scaling_factor: f64,
    #[serde(default)]
    pub equal_loudness: bool,
}

impl GainConfig {
    fn default_reference_frequency() -> f64 {
        55.0
    }
    fn default_scaling_factor() -> f64 {
        0.4
    }
    fn default_minimum_gain() -> f64 {
        0.05
    }
    fn default_maximum_gain() -> f64 {
        1.2
    }
    fn default_high_frequency_cutoff() -> f64 {
        2000.0
    }
    fn default_high_frequency_scaling_factor() -> f64 {
        0.6
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("gain.reference_frequency", self.reference_frequency),
            ("gain.high_frequency_cutoff", self.high_frequency_cutoff),
        ];
        for (field, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: format!("must be a positive number, got {value}"),
                });
            }
        }
        let non_negative = [
            ("gain.scaling_factor", self.scaling_factor),
            ("gain.high_frequency_scaling_factor", self.high_frequency_scaling_factor),
            ("gain.minimum_gain", self.minimum_gain),
        ];
        for (field, value) in non_negative {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(ConfigError::InvalidSetting {
                    field,
                    reason: format!("must be >= 0, got {value}"),
                });
            }
        }
        if !(self.minimum_gain <= self.maximum_gain) || !self.maximum_gain.is_finite() {
            return Err(ConfigError::InvalidSetting {
                field: "gain.maximum_gain",
                reason: format!(
                    "must be >= minimum_gain ({}), got {}",
                    self.minimum_gain, self.maximum_gain
                ),
            });
        }
        Ok(())
    }
}

impl Default for GainConfig {
    fn default() -> Self {
        GainConfig {
            reference_frequency: Self::default_reference_frequency(),
            scaling_factor: Self::default_scaling_factor(),
            minimum_gain: Self::default_minimum_gain(),
            maximum_gain: Self::default_maximum_gain(),
            high_frequency_cutoff: Self::default_high_frequency_cutoff(),
            high_frequency_scaling_factor: Self::default_high_frequency_scaling_factor(),
            equal_loudness: false,
        }
    }
}

/// Frequency of peak hearing sensitivity (Hz).
const SENSITIVITY_PEAK_HZ: f64 = 3500.0;
/// How strongly the sensitivity curve reduces gain.
const SENSITIVITY_WEIGHT: f64 = 0.7;

/// Simplified equal-loudness curve in [0.01, 1], peaking near 3.5 kHz.
pub fn hearing_sensitivity(frequency: f64) -> f64 {
    if !(20.0..=20_000.0).contains(&frequency) {
        return 0.01;
    }
    let log_distance = (frequency.log10() - SENSITIVITY_PEAK_HZ.log10()).abs();
    let mut sensitivity = 1.0 - (log_distance * 0.7).min(1.0);
    if frequency < 100.0 {
        sensitivity *= frequency / 100.0;
    }
    sensitivity.clamp(0.01, 1.0)
}

/// Output gain multiplier for a tone at `frequency`.
pub fn gain(frequency: f64, config: &GainConfig) -> f64 {
    // Never panics, even when minimum_gain > maximum_gain
    let bound = |v: f64| v.max(config.minimum_gain).min(config.maximum_gain);
    if !(frequency > 0.0) || !frequency.is_finite() {
        return bound(1.0);
    }

    let mut value = (config.reference_frequency / frequency).powf(config.scaling_factor);

    if frequency > config.high_frequency_cutoff {
        value *= (config.high_frequency_cutoff / frequency)
            .powf(config.high_frequency_scaling_factor);
    }

    if config.equal_loudness {
        let adjustment = 1.0 - hearing_sensitivity(frequency) * SENSITIVITY_WEIGHT;
        value *= 0.3 + 0.7 * adjustment;
    }

    bound(value)
}
