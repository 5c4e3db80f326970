//! Audio graph seam.
//!
//! The reconciler, sequence player and master bus never touch samples
//! directly; they drive an [`AudioGraph`]. [`crate::dsp::graph::SynthGraph`]
//! is the in-process implementation.

use serde::Serialize;

use crate::bodies::BodyId;
use crate::error::{SystemFault, VoiceFault};

/// Result of asking the output device to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputStatus {
    Ready,
    /// Not yet permitted to produce sound. Retry on the next pass or action.
    Suspended,
}

impl OutputStatus {
    pub fn is_ready(self) -> bool {
        self == OutputStatus::Ready
    }
}

pub trait AudioGraph {
    /// Try to (re)activate the output. Idempotent.
    fn ensure_output_ready(&mut self) -> OutputStatus;

    /// Allocate an isolated oscillator + gain pair for `body` and attack it.
    fn start_voice(&mut self, body: BodyId, frequency: f64, gain: f64) -> Result<(), VoiceFault>;

    /// Retune a held voice and ramp its gain over `ramp_seconds`.
    fn update_voice(
        &mut self,
        body: BodyId,
        frequency: f64,
        gain: f64,
        ramp_seconds: f64,
    ) -> Result<(), VoiceFault>;

    /// Release a held voice over `release_seconds` and free its gain stage.
    fn release_voice(&mut self, body: BodyId, release_seconds: f64) -> Result<(), VoiceFault>;

    /// Drop a voice immediately, without a release tail.
    fn dispose_voice(&mut self, body: BodyId);

    /// Whether a held voice for `body` is currently sounding.
    fn is_sounding(&self, body: BodyId) -> bool;

    /// Every body with a held voice.
    fn sounding_voices(&self) -> Vec<BodyId>;

    /// Dispose every voice and the shared output stage, then reinitialize.
    fn rebuild(&mut self) -> Result<(), SystemFault>;

    /// Write the master gain immediately.
    fn set_master_gain(&mut self, value: f64);

    /// Ramp the master gain to `value`.
    fn ramp_master_gain(&mut self, value: f64, ramp_seconds: f64);

    /// Play one note on the shared sequence instrument.
    fn play_note(
        &mut self,
        body: BodyId,
        frequency: f64,
        gain: f64,
        duration_seconds: f64,
    ) -> Result<(), VoiceFault>;

    /// Silence every note of the sequence instrument.
    fn cancel_notes(&mut self);

    /// Recreate the sequence instrument from scratch.
    fn rebuild_instrument(&mut self) -> Result<(), SystemFault>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording graph with fault injection.

    use std::collections::{BTreeMap, HashSet};

    use super::*;
    use crate::error::VoiceOp;

    #[derive(Debug, Default)]
    pub struct RecordingGraph {
        pub suspended: bool,
        pub voices: BTreeMap<BodyId, (f64, f64)>,
        pub starts: Vec<BodyId>,
        pub updates: Vec<BodyId>,
        pub releases: Vec<BodyId>,
        pub disposes: Vec<BodyId>,
        pub rebuilds: usize,
        pub fail_start: HashSet<BodyId>,
        pub fail_rebuild: bool,
        pub master_writes: Vec<f64>,
        pub master_ramps: Vec<(f64, f64)>,
        pub notes: Vec<(BodyId, f64, f64, f64)>,
        pub note_cancels: usize,
        pub instrument_rebuilds: usize,
    }

    impl RecordingGraph {
        pub fn new() -> Self {
            Self::default()
        }

        /// Lose a voice behind the reconciler's back.
        pub fn drop_voice(&mut self, body: BodyId) {
            self.voices.remove(&body);
        }

        /// Create a voice the reconciler does not know about.
        pub fn inject_voice(&mut self, body: BodyId) {
            self.voices.insert(body, (440.0, 1.0));
        }

        pub fn clear_log(&mut self) {
            self.starts.clear();
            self.updates.clear();
            self.releases.clear();
            self.disposes.clear();
            self.rebuilds = 0;
        }

        pub fn count(log: &[BodyId], body: BodyId) -> usize {
            log.iter().filter(|&&b| b == body).count()
        }
    }

    impl AudioGraph for RecordingGraph {
        fn ensure_output_ready(&mut self) -> OutputStatus {
            if self.suspended {
                OutputStatus::Suspended
            } else {
                OutputStatus::Ready
            }
        }

        fn start_voice(&mut self, body: BodyId, frequency: f64, gain: f64) -> Result<(), VoiceFault> {
            if self.fail_start.contains(&body) {
                return Err(VoiceFault::new(body, VoiceOp::Create, "injected"));
            }
            self.starts.push(body);
            self.voices.insert(body, (frequency, gain));
            Ok(())
        }

        fn update_voice(
            &mut self,
            body: BodyId,
            frequency: f64,
            gain: f64,
            _ramp_seconds: f64,
        ) -> Result<(), VoiceFault> {
            match self.voices.get_mut(&body) {
                Some(v) => {
                    *v = (frequency, gain);
                    self.updates.push(body);
                    Ok(())
                }
                None => Err(VoiceFault::new(body, VoiceOp::Update, "no such voice")),
            }
        }

        fn release_voice(&mut self, body: BodyId, _release_seconds: f64) -> Result<(), VoiceFault> {
            self.releases.push(body);
            self.voices.remove(&body);
            Ok(())
        }

        fn dispose_voice(&mut self, body: BodyId) {
            self.disposes.push(body);
            self.voices.remove(&body);
        }

        fn is_sounding(&self, body: BodyId) -> bool {
            self.voices.contains_key(&body)
        }

        fn sounding_voices(&self) -> Vec<BodyId> {
            self.voices.keys().copied().collect()
        }

        fn rebuild(&mut self) -> Result<(), SystemFault> {
            if self.fail_rebuild {
                return Err(SystemFault::new("injected"));
            }
            self.rebuilds += 1;
            self.voices.clear();
            Ok(())
        }

        fn set_master_gain(&mut self, value: f64) {
            self.master_writes.push(value);
        }

        fn ramp_master_gain(&mut self, value: f64, ramp_seconds: f64) {
            self.master_ramps.push((value, ramp_seconds));
        }

        fn play_note(
            &mut self,
            body: BodyId,
            frequency: f64,
            gain: f64,
            duration_seconds: f64,
        ) -> Result<(), VoiceFault> {
            self.notes.push((body, frequency, gain, duration_seconds));
            Ok(())
        }

        fn cancel_notes(&mut self) {
            self.note_cancels += 1;
        }

        fn rebuild_instrument(&mut self) -> Result<(), SystemFault> {
            self.instrument_rebuilds += 1;
            Ok(())
        }
    }
}
