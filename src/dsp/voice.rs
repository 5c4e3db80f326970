//! One body's tone: oscillator → envelope → isolated gain stage.

use super::envelope::{Envelope, EnvelopeShape};
use super::oscillator::{Oscillator, Waveform};
use super::param::{RampedParam, seconds_to_samples};

#[derive(Debug, Clone)]
pub struct BodyVoice {
    pub oscillator: Oscillator,
    pub envelope: Envelope,
    /// Per-voice gain. Never shared between bodies.
    gain: RampedParam,
    sample_rate: f64,
    /// Samples left before an automatic gate-off (sequence notes).
    hold_samples: Option<usize>,
}

impl BodyVoice {
    pub fn new(waveform: Waveform, shape: EnvelopeShape, sample_rate: f64) -> Self {
        BodyVoice {
            oscillator: Oscillator::new(waveform, sample_rate),
            envelope: Envelope::new(shape, sample_rate),
            gain: RampedParam::new(0.0),
            sample_rate,
            hold_samples: None,
        }
    }

    /// A held body tone, sounding until released.
    pub fn held(sample_rate: f64) -> Self {
        Self::new(Waveform::Sine, EnvelopeShape::HELD, sample_rate)
    }

    /// A sequence note that releases itself after `duration` seconds.
    pub fn note(sample_rate: f64, duration: f64) -> Self {
        let mut voice = Self::new(Waveform::Triangle, EnvelopeShape::PLUCK, sample_rate);
        voice.hold_samples = Some(seconds_to_samples(duration, sample_rate));
        voice
    }

    pub fn note_on(&mut self, frequency: f64, gain: f64) {
        self.oscillator.set_frequency(frequency);
        self.oscillator.reset();
        self.gain.set(gain);
        self.envelope.gate_on();
    }

    pub fn frequency(&self) -> f64 {
        self.oscillator.frequency()
    }

    /// Target of the gain stage (where any ramp will land).
    pub fn gain(&self) -> f64 {
        self.gain.target()
    }

    /// Retune immediately and ramp the gain over `ramp_seconds`.
    pub fn retarget(&mut self, frequency: f64, gain: f64, ramp_seconds: f64) {
        self.oscillator.set_frequency(frequency);
        self.gain
            .ramp_to(gain, seconds_to_samples(ramp_seconds, self.sample_rate));
    }

    pub fn release(&mut self, seconds: f64) {
        self.hold_samples = None;
        self.envelope.release_over(seconds);
    }

    pub fn is_releasing(&self) -> bool {
        self.envelope.is_releasing()
    }

    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.is_finished() {
            return 0.0;
        }
        if let Some(left) = self.hold_samples.as_mut() {
            if *left == 0 {
                self.hold_samples = None;
                self.envelope.gate_off();
            } else {
                *left -= 1;
            }
        }
        let osc = self.oscillator.next_sample();
        let env = self.envelope.next_sample();
        osc * env * self.gain.next_value()
    }
}
