//! In-process [`AudioGraph`]: held body voices, release tails, the sequence
//! instrument and the master stage, rendered block by block.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::mixer::Mixer;
use super::voice::BodyVoice;
use crate::bodies::BodyId;
use crate::error::{SystemFault, VoiceFault, VoiceOp};
use crate::graph::{AudioGraph, OutputStatus};

/// Release used when a held voice is replaced or an instrument note is cancelled.
const CUT_SECONDS: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct SynthGraph {
    sample_rate: f64,
    max_voices: usize,
    /// Host has allowed audio (e.g. after a user gesture).
    output_permitted: bool,
    running: bool,
    held: BTreeMap<BodyId, BodyVoice>,
    tails: Vec<BodyVoice>,
    notes: Vec<BodyVoice>,
    mixer: Mixer,
    generation: u64,
}

impl SynthGraph {
    pub fn new(sample_rate: f64) -> Self {
        SynthGraph {
            sample_rate,
            max_voices: 64,
            output_permitted: false,
            running: false,
            held: BTreeMap::new(),
            tails: Vec::new(),
            notes: Vec::new(),
            mixer: Mixer::new(0.0),
            generation: 0,
        }
    }

    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    /// Allow the output to run. Until called, [`AudioGraph::ensure_output_ready`]
    /// reports [`OutputStatus::Suspended`].
    pub fn resume_output(&mut self) {
        self.output_permitted = true;
    }

    /// Revoke output permission and stop rendering.
    pub fn suspend_output(&mut self) {
        self.output_permitted = false;
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Number of full rebuilds performed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn master_gain(&self) -> f64 {
        self.mixer.master.target()
    }

    pub fn held_voice(&self, body: BodyId) -> Option<&BodyVoice> {
        self.held.get(&body)
    }

    pub fn active_notes(&self) -> usize {
        self.notes.len()
    }

    /// Held voices, release tails and instrument notes still producing sound.
    pub fn voice_count(&self) -> usize {
        self.held.len() + self.tails.len() + self.notes.len()
    }

    /// Nothing left to render.
    pub fn is_idle(&self) -> bool {
        self.voice_count() == 0
    }

    /// Render the next block into `out`. Writes silence while not running.
    pub fn render(&mut self, out: &mut [f32]) {
        if !self.running {
            out.fill(0.0);
            return;
        }
        self.mixer.clear(out.len());
        for i in 0..out.len() {
            let mut sum = 0.0;
            for voice in self.held.values_mut() {
                sum += voice.next_sample();
            }
            for voice in self.tails.iter_mut().chain(self.notes.iter_mut()) {
                sum += voice.next_sample();
            }
            self.mixer.add(i, sum);
        }
        self.mixer.write_output(out);
        self.tails.retain(|v| !v.is_finished());
        self.notes.retain(|v| !v.is_finished());
    }

    fn has_capacity(&self) -> bool {
        self.voice_count() < self.max_voices
    }
}

impl AudioGraph for SynthGraph {
    fn ensure_output_ready(&mut self) -> OutputStatus {
        if self.output_permitted {
            if !self.running {
                debug!("audio output running");
            }
            self.running = true;
            OutputStatus::Ready
        } else {
            OutputStatus::Suspended
        }
    }

    fn start_voice(&mut self, body: BodyId, frequency: f64, gain: f64) -> Result<(), VoiceFault> {
        if !(frequency > 0.0 && frequency.is_finite()) {
            return Err(VoiceFault::new(
                body,
                VoiceOp::Create,
                format!("invalid frequency {frequency}"),
            ));
        }
        if let Some(mut previous) = self.held.remove(&body) {
            previous.release(CUT_SECONDS);
            self.tails.push(previous);
        }
        if !self.has_capacity() {
            return Err(VoiceFault::new(body, VoiceOp::Create, "voice limit reached"));
        }
        let mut voice = BodyVoice::held(self.sample_rate);
        voice.note_on(frequency, gain);
        self.held.insert(body, voice);
        Ok(())
    }

    fn update_voice(
        &mut self,
        body: BodyId,
        frequency: f64,
        gain: f64,
        ramp_seconds: f64,
    ) -> Result<(), VoiceFault> {
        match self.held.get_mut(&body) {
            Some(voice) => {
                voice.retarget(frequency, gain, ramp_seconds);
                Ok(())
            }
            None => Err(VoiceFault::new(body, VoiceOp::Update, "no held voice")),
        }
    }

    fn release_voice(&mut self, body: BodyId, release_seconds: f64) -> Result<(), VoiceFault> {
        match self.held.remove(&body) {
            Some(mut voice) => {
                voice.release(release_seconds);
                self.tails.push(voice);
                Ok(())
            }
            None => Err(VoiceFault::new(body, VoiceOp::Release, "no held voice")),
        }
    }

    fn dispose_voice(&mut self, body: BodyId) {
        self.held.remove(&body);
    }

    fn is_sounding(&self, body: BodyId) -> bool {
        self.held.get(&body).is_some_and(|v| !v.is_finished())
    }

    fn sounding_voices(&self) -> Vec<BodyId> {
        self.held.keys().copied().collect()
    }

    fn rebuild(&mut self) -> Result<(), SystemFault> {
        if !(self.sample_rate > 0.0 && self.sample_rate.is_finite()) {
            return Err(SystemFault::new(format!(
                "cannot build output stage at sample rate {}",
                self.sample_rate
            )));
        }
        self.held.clear();
        self.tails.clear();
        self.notes.clear();
        self.mixer = Mixer::new(self.mixer.master.target());
        self.generation += 1;
        debug!(generation = self.generation, "audio graph rebuilt");
        Ok(())
    }

    fn set_master_gain(&mut self, value: f64) {
        self.mixer.master.set(value);
    }

    fn ramp_master_gain(&mut self, value: f64, ramp_seconds: f64) {
        let samples = super::param::seconds_to_samples(ramp_seconds, self.sample_rate);
        self.mixer.master.ramp_to(value, samples);
    }

    fn play_note(
        &mut self,
        body: BodyId,
        frequency: f64,
        gain: f64,
        duration_seconds: f64,
    ) -> Result<(), VoiceFault> {
        if !self.has_capacity() {
            warn!(%body, "instrument polyphony exhausted");
            return Err(VoiceFault::new(body, VoiceOp::Create, "voice limit reached"));
        }
        let mut note = BodyVoice::note(self.sample_rate, duration_seconds);
        note.note_on(frequency, gain);
        self.notes.push(note);
        Ok(())
    }

    fn cancel_notes(&mut self) {
        for note in &mut self.notes {
            note.release(CUT_SECONDS);
        }
    }

    fn rebuild_instrument(&mut self) -> Result<(), SystemFault> {
        self.notes.clear();
        Ok(())
    }
}
