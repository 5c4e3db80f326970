//! Master bus: the single output level after every voice and the
//! sequence instrument.

use crate::graph::AudioGraph;

/// Linear gain to decibels; −∞ for silence.
pub fn gain_to_db(gain: f64) -> f64 {
    if gain > 0.0 {
        20.0 * gain.log10()
    } else {
        f64::NEG_INFINITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasterBus {
    volume: f64,
    ramp_seconds: f64,
}

impl MasterBus {
    pub fn new(volume: f64, ramp_ms: f64) -> Self {
        MasterBus {
            volume: clamp_volume(volume),
            ramp_seconds: ramp_ms.max(0.0) / 1000.0,
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// Display-only readout of the current level.
    pub fn decibels(&self) -> f64 {
        gain_to_db(self.volume)
    }

    /// Set the output level in [0, 1]. Returns the clamped value.
    ///
    /// Writes the value immediately and also schedules a short ramp to it,
    /// so the level lands even if one of the two mechanisms is ignored.
    pub fn set_volume(&mut self, volume: f64, graph: &mut dyn AudioGraph) -> f64 {
        self.volume = clamp_volume(volume);
        self.apply(graph);
        self.volume
    }

    /// Push the stored level to the graph (after a rebuild recreated the output stage).
    pub fn apply(&self, graph: &mut dyn AudioGraph) {
        graph.ensure_output_ready();
        graph.set_master_gain(self.volume);
        graph.ramp_master_gain(self.volume, self.ramp_seconds);
    }
}

fn clamp_volume(volume: f64) -> f64 {
    if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) }
}
