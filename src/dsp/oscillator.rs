//! Phase-continuous oscillators.
//!
//! Live voices are retuned every animation frame, so frequency changes keep
//! the running phase instead of restarting the cycle.

use std::f64::consts::TAU;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
}

#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    frequency: f64,
    /// Phase in cycles, [0, 1).
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            frequency: 440.0,
            phase: 0.0,
            sample_rate,
        }
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Retune without touching the phase. Non-positive values are ignored.
    pub fn set_frequency(&mut self, frequency: f64) {
        if frequency > 0.0 && frequency.is_finite() {
            self.frequency = frequency;
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    pub fn next_sample(&mut self) -> f64 {
        let sample = match self.waveform {
            Waveform::Sine => (TAU * self.phase).sin(),
            // -1 → +1 over the first half cycle, back down over the second
            Waveform::Triangle => 1.0 - 4.0 * (self.phase - 0.5).abs(),
        };
        // Nyquist-bound the increment so very high tones cannot alias into DC
        let inc = (self.frequency / self.sample_rate).min(0.5);
        self.phase = (self.phase + inc).fract();
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_starts_at_zero() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        assert!(osc.next_sample().abs() < 1e-12);
    }

    #[test]
    fn outputs_stay_in_range() {
        for waveform in [Waveform::Sine, Waveform::Triangle] {
            let mut osc = Oscillator::new(waveform, 44100.0);
            osc.set_frequency(523.25);
            for _ in 0..44100 {
                let s = osc.next_sample();
                assert!((-1.0..=1.0).contains(&s), "{waveform:?} out of range: {s}");
            }
        }
    }

    #[test]
    fn triangle_shape() {
        let mut osc = Oscillator::new(Waveform::Triangle, 4.0);
        osc.set_frequency(1.0);
        let cycle: Vec<f64> = (0..4).map(|_| osc.next_sample()).collect();
        assert_eq!(cycle, vec![-1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn retune_keeps_phase() {
        let mut osc = Oscillator::new(Waveform::Sine, 48_000.0);
        osc.set_frequency(440.0);
        for _ in 0..100 {
            osc.next_sample();
        }
        let before = osc.phase;
        osc.set_frequency(660.0);
        assert_eq!(osc.phase, before);
        assert_eq!(osc.frequency(), 660.0);
    }

    #[test]
    fn ignores_invalid_frequency() {
        let mut osc = Oscillator::new(Waveform::Sine, 48_000.0);
        osc.set_frequency(0.0);
        osc.set_frequency(f64::NAN);
        assert_eq!(osc.frequency(), 440.0);
    }

    #[test]
    fn completes_one_cycle_per_period() {
        let mut osc = Oscillator::new(Waveform::Sine, 48_000.0);
        osc.set_frequency(480.0);
        for _ in 0..100 {
            osc.next_sample();
        }
        assert!(osc.phase < 1e-9 || (1.0 - osc.phase) < 1e-9, "phase {}", osc.phase);
    }
}
