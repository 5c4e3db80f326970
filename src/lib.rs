pub mod bodies;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod frequency;
pub mod gain;
pub mod graph;
pub mod master;
pub mod orbit;
pub mod reconciler;
pub mod sequence;

use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

use crate::bodies::{BodyId, DistanceModel, solar_system};
use crate::config::EngineConfig;
use crate::dsp::graph::SynthGraph;
use crate::engine::OrbitalEngine;
use crate::error::ConfigError;
use crate::gain::GainConfig;
use crate::orbit::PositionOverride;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the crate version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Load a config from optional JSON; `None` or an empty string means defaults.
pub fn load_config(config_json: Option<&str>) -> Result<EngineConfig, ConfigError> {
    match config_json.map(str::trim) {
        Some(json) if !json.is_empty() => EngineConfig::from_json(json),
        _ => Ok(EngineConfig::default()),
    }
}

/// Parse a kebab-case keyword such as `"aphelion"` or `"actual"`.
pub fn parse_keyword<T: DeserializeOwned>(field: &'static str, word: &str) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(word.to_string())).map_err(|_| {
        ConfigError::InvalidSetting {
            field,
            reason: format!("unknown value '{word}'"),
        }
    })
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

/// WASM-exposed engine over the solar-system table and the built-in synth.
#[wasm_bindgen]
pub struct OrbitalSonifier {
    engine: OrbitalEngine<SynthGraph>,
}

#[wasm_bindgen]
impl OrbitalSonifier {
    /// `sample_rate` overrides `audio.sample_rate` from the config.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>, sample_rate: Option<u32>) -> Result<OrbitalSonifier, JsValue> {
        let mut config = load_config(config_json.as_deref()).map_err(to_js)?;
        if let Some(rate) = sample_rate {
            config.audio.sample_rate = rate;
        }
        let graph = SynthGraph::new(config.audio.sample_rate as f64);
        let engine = OrbitalEngine::with_solar_system(config, graph).map_err(to_js)?;
        Ok(OrbitalSonifier { engine })
    }

    /// Call from a user gesture; output stays suspended until then.
    pub fn resume_output(&mut self) {
        self.engine.graph_mut().resume_output();
    }

    /// Advance both drivers by `dt` seconds of wall time.
    pub fn advance(&mut self, dt: f64) -> usize {
        self.engine.advance(dt)
    }

    /// Fill an audio block with the next mono samples.
    pub fn render(&mut self, out: &mut [f32]) {
        self.engine.graph_mut().render(out);
    }

    pub fn body_count(&self) -> usize {
        self.engine.bodies().len()
    }

    /// Returns whether the body is now enabled.
    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<bool, JsValue> {
        self.engine
            .set_enabled(BodyId(index), enabled)
            .map(|diff| diff.enabled)
            .ok_or_else(|| JsValue::from_str(&format!("no body at index {index}")))
    }

    pub fn toggle(&mut self, index: usize) -> Result<bool, JsValue> {
        self.engine
            .toggle(BodyId(index))
            .map(|diff| diff.enabled)
            .ok_or_else(|| JsValue::from_str(&format!("no body at index {index}")))
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.engine.set_paused(paused);
    }

    /// `"average"`, `"aphelion"` or `"perihelion"`.
    pub fn trigger_position(&mut self, position: &str) -> Result<(), JsValue> {
        let position: PositionOverride = parse_keyword("position", position).map_err(to_js)?;
        self.engine.trigger_position(position);
        Ok(())
    }

    pub fn set_base_frequency(&mut self, base_frequency: f64) -> Result<(), JsValue> {
        self.engine.set_base_frequency(base_frequency).map_err(to_js)
    }

    /// `"theoretical"` or `"actual"`.
    pub fn set_distance_model(&mut self, model: &str) -> Result<(), JsValue> {
        let model: DistanceModel = parse_keyword("audio.distance_model", model).map_err(to_js)?;
        self.engine.set_distance_model(model);
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), JsValue> {
        self.engine.set_speed(speed).map_err(to_js)
    }

    pub fn set_master_volume(&mut self, volume: f64) -> f64 {
        self.engine.set_master_volume(volume)
    }

    /// Returns whether the voices matched the enabled set afterwards.
    pub fn set_live_mode(&mut self, on: bool) -> bool {
        self.engine.set_live_mode(on).consistent
    }

    pub fn start_sequence(&mut self) -> Result<(), JsValue> {
        self.engine.start_sequence().map(|_| ()).map_err(to_js)
    }

    pub fn stop_sequence(&mut self) {
        self.engine.stop_sequence();
    }

    pub fn set_tempo(&mut self, tempo_bpm: f64) -> Result<(), JsValue> {
        self.engine.set_tempo(tempo_bpm).map_err(to_js)
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.engine.set_looping(looping);
    }

    /// Replace the gain-safety settings from a JS object.
    pub fn set_gain_config(&mut self, config: JsValue) -> Result<(), JsValue> {
        let config: GainConfig = serde_wasm_bindgen::from_value(config).map_err(to_js)?;
        self.engine.set_gain_config(config).map_err(to_js)
    }

    pub fn shutdown(&mut self) {
        self.engine.shutdown();
    }

    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.engine.snapshot()).map_err(to_js)
    }
}

/// WASM-exposed: render one pass of the sequence over the solar system to a WAV byte array.
#[wasm_bindgen]
pub fn render_sequence_wav(config_json: Option<String>, sample_rate: u32) -> Result<Vec<u8>, JsValue> {
    let config = load_config(config_json.as_deref()).map_err(to_js)?;
    dsp::renderer::render_sequence_wav(config, solar_system(), sample_rate).map_err(to_js)
}

/// WASM-exposed: the default configuration as pretty JSON.
#[wasm_bindgen]
pub fn default_config_json() -> Result<String, JsValue> {
    EngineConfig::default().to_json().map_err(to_js)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_default_config_when_absent() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
        assert_eq!(load_config(Some("  ")).unwrap(), EngineConfig::default());
        let config = load_config(Some(r#"{ "audio": { "base_frequency": 110.0 } }"#)).unwrap();
        assert_eq!(config.audio.base_frequency, 110.0);
        assert!(load_config(Some("[1, 2]")).is_err());
    }

    #[test]
    fn parses_keywords() {
        let position: PositionOverride = parse_keyword("position", "aphelion").unwrap();
        assert_eq!(position, PositionOverride::Aphelion);
        let model: DistanceModel = parse_keyword("audio.distance_model", "actual").unwrap();
        assert_eq!(model, DistanceModel::Actual);
        let err = parse_keyword::<DistanceModel>("audio.distance_model", "bogus").unwrap_err();
        assert!(format!("{err}").contains("bogus"));
    }

    #[test]
    fn version_matches_manifest() {
        assert_eq!(core_version(), env!("CARGO_PKG_VERSION"));
    }
}
