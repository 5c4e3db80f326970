use serde::{Deserialize, Serialize};

use crate::bodies::DistanceModel;
use crate::error::ConfigError;
use crate::gain::GainConfig;
use crate::reconciler::ReconcilerConfig;
use crate::sequence::SequenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitConfig {
    /// Wall-clock seconds per unit orbital period.
    #[serde(default = "OrbitConfig::default_time_scale")]
    pub time_scale: f64,
    #[serde(default = "OrbitConfig::default_speed")]
    pub speed: f64,
    /// Scale orbital speed by `base_frequency / 220`.
    #[serde(default)]
    pub couple_speed_to_base_frequency: bool,
}

impl OrbitConfig {
    fn default_time_scale() -> f64 {
        20.0
    }
    fn default_speed() -> f64 {
        1.0
    }
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            time_scale: Self::default_time_scale(),
            speed: Self::default_speed(),
            couple_speed_to_base_frequency: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "AudioConfig::default_base_frequency")]
    pub base_frequency: f64,
    #[serde(default)]
    pub distance_model: DistanceModel,
    #[serde(default = "AudioConfig::default_master_volume")]
    pub master_volume: f64,
    #[serde(default = "AudioConfig::default_master_ramp_ms")]
    pub master_ramp_ms: f64,
    #[serde(default = "AudioConfig::default_sample_rate")]
    pub sample_rate: u32,
}

impl AudioConfig {
    fn default_base_frequency() -> f64 {
        220.0
    }
    fn default_master_volume() -> f64 {
        0.7
    }
    fn default_master_ramp_ms() -> f64 {
        30.0
    }
    fn default_sample_rate() -> u32 {
        48_000
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            base_frequency: Self::default_base_frequency(),
            distance_model: DistanceModel::default(),
            master_volume: Self::default_master_volume(),
            master_ramp_ms: Self::default_master_ramp_ms(),
            sample_rate: Self::default_sample_rate(),
        }
    }
}

/// Complete engine configuration. Every field has a default, so `{}` is a
/// valid JSON config.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub orbit: OrbitConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub gain: GainConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("orbit.time_scale", self.orbit.time_scale),
            ("audio.base_frequency", self.audio.base_frequency),
            ("reconciler.period_ms", self.reconciler.period_ms),
        ];
        for (field, value) in positive {
            require_positive(field, value)?;
        }
        let non_negative = [
            ("orbit.speed", self.orbit.speed),
            ("audio.master_ramp_ms", self.audio.master_ramp_ms),
            ("reconciler.gain_ramp_ms", self.reconciler.gain_ramp_ms),
            ("reconciler.release_ms", self.reconciler.release_ms),
        ];
        for (field, value) in non_negative {
            require_non_negative(field, value)?;
        }
        if !(0.0..=1.0).contains(&self.audio.master_volume) {
            return Err(ConfigError::InvalidSetting {
                field: "audio.master_volume",
                reason: format!("must be in [0, 1], got {}", self.audio.master_volume),
            });
        }
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "audio.sample_rate",
                reason: "must be > 0".to_string(),
            });
        }
        if self.reconciler.fault_threshold == 0 || self.reconciler.system_fault_threshold == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "reconciler.fault_threshold",
                reason: "fault thresholds must be at least 1".to_string(),
            });
        }
        self.gain.validate()?;
        self.sequence.validate()?;
        Ok(())
    }
}

pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting {
            field,
            reason: format!("must be a positive number, got {value}"),
        })
    }
}

pub(crate) fn require_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting {
            field,
            reason: format!("must be >= 0, got {value}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_default() {
        let config = EngineConfig::from_json("{}").expect("config");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let json = r#"{
            "audio": { "base_frequency": 110.0, "distance_model": "actual" },
            "gain": { "equal_loudness": true },
            "sequence": { "tempo_bpm": 60.0, "looping": true }
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.audio.base_frequency, 110.0);
        assert_eq!(config.audio.distance_model, DistanceModel::Actual);
        assert_eq!(config.audio.master_volume, 0.7);
        assert!(config.gain.equal_loudness);
        assert_eq!(config.gain.reference_frequency, 55.0);
        assert!(config.sequence.looping);
        assert_eq!(config.reconciler.fault_threshold, 2);
    }

    #[test]
    fn roundtrip_through_json() {
        let config = EngineConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn orbit_section_lists_only_used_settings() {
        let value: serde_json::Value = serde_json::from_str(&EngineConfig::default().to_json().unwrap()).unwrap();
        let keys: Vec<&str> = value["orbit"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["couple_speed_to_base_frequency", "speed", "time_scale"]);
    }

    #[test]
    fn rejects_invalid_values() {
        let cases = [
            r#"{ "audio": { "base_frequency": 0.0 } }"#,
            r#"{ "audio": { "master_volume": 1.5 } }"#,
            r#"{ "orbit": { "time_scale": -1.0 } }"#,
            r#"{ "sequence": { "tempo_bpm": 0.0 } }"#,
            r#"{ "gain": { "minimum_gain": 2.0 } }"#,
            r#"{ "reconciler": { "fault_threshold": 0 } }"#,
        ];
        for json in cases {
            assert!(
                matches!(EngineConfig::from_json(json), Err(ConfigError::InvalidSetting { .. })),
                "should reject {json}"
            );
        }
    }

    #[test]
    fn reports_parse_errors() {
        let err = EngineConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
