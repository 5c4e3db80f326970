//! Amplitude envelope: attack, decay, sustain hold and a release whose
//! length is chosen when the gate closes.

/// Envelope timings in seconds; `sustain` is a level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
}

impl EnvelopeShape {
    /// Held body tones: soft onset, full sustain.
    pub const HELD: EnvelopeShape = EnvelopeShape {
        attack: 0.05,
        decay: 0.0,
        sustain: 1.0,
        release: 0.08,
    };

    /// Sequence instrument: plucked attack settling to a lower sustain.
    pub const PLUCK: EnvelopeShape = EnvelopeShape {
        attack: 0.005,
        decay: 0.1,
        sustain: 0.3,
        release: 0.5,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear segment envelope. Each stage moves the level toward a target by a
/// fixed per-sample step, so retriggering or releasing mid-stage never jumps.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub shape: EnvelopeShape,
    sample_rate: f64,
    stage: Stage,
    level: f64,
    step: f64,
    remaining: usize,
}

impl Envelope {
    pub fn new(shape: EnvelopeShape, sample_rate: f64) -> Self {
        Envelope {
            shape,
            sample_rate,
            stage: Stage::Idle,
            level: 0.0,
            step: 0.0,
            remaining: 0,
        }
    }

    pub fn gate_on(&mut self) {
        self.enter(Stage::Attack, 1.0, self.shape.attack);
    }

    /// Close the gate using the shape's release time.
    pub fn gate_off(&mut self) {
        self.release_over(self.shape.release);
    }

    /// Close the gate with an explicit release time.
    pub fn release_over(&mut self, seconds: f64) {
        if self.stage == Stage::Idle {
            return;
        }
        self.enter(Stage::Release, 0.0, seconds);
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == Stage::Release
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Idle
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn next_sample(&mut self) -> f64 {
        if self.remaining > 0 {
            self.level += self.step;
            self.remaining -= 1;
            if self.remaining == 0 {
                self.finish_stage();
            }
        } else if matches!(self.stage, Stage::Attack | Stage::Decay | Stage::Release) {
            self.finish_stage();
        }
        self.level
    }

    fn enter(&mut self, stage: Stage, target: f64, seconds: f64) {
        let samples = (seconds.max(0.0) * self.sample_rate) as usize;
        self.stage = stage;
        self.remaining = samples;
        self.step = if samples == 0 {
            0.0
        } else {
            (target - self.level) / samples as f64
        };
    }

    fn finish_stage(&mut self) {
        match self.stage {
            Stage::Attack => {
                self.level = 1.0;
                let sustain = self.shape.sustain.clamp(0.0, 1.0);
                if self.shape.decay > 0.0 && sustain < 1.0 {
                    self.enter(Stage::Decay, sustain, self.shape.decay);
                } else {
                    self.level = sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Decay => {
                self.level = self.shape.sustain.clamp(0.0, 1.0);
                self.stage = Stage::Sustain;
            }
            Stage::Release => {
                self.level = 0.0;
                self.stage = Stage::Idle;
            }
            Stage::Idle | Stage::Sustain => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48_000.0;

    fn run(env: &mut Envelope, samples: usize) -> Vec<f64> {
        (0..samples).map(|_| env.next_sample()).collect()
    }

    #[test]
    fn starts_idle() {
        let env = Envelope::new(EnvelopeShape::HELD, SR);
        assert!(env.is_finished());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn held_shape_sustains_at_full_level() {
        let mut env = Envelope::new(EnvelopeShape::HELD, SR);
        env.gate_on();
        let out = run(&mut env, 4800);
        assert!((out[4799] - 1.0).abs() < 1e-9, "got {}", out[4799]);
        assert!(!env.is_finished());
    }

    #[test]
    fn pluck_decays_to_sustain() {
        let mut env = Envelope::new(EnvelopeShape::PLUCK, SR);
        env.gate_on();
        let out = run(&mut env, 12_000);
        let peak = out.iter().cloned().fold(0.0, f64::max);
        assert!((peak - 1.0).abs() < 1e-6, "peak {peak}");
        assert!((out[11_999] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn release_time_is_chosen_at_gate_off() {
        let mut env = Envelope::new(EnvelopeShape::HELD, SR);
        env.gate_on();
        run(&mut env, 4800);
        env.release_over(0.08);
        assert!(env.is_releasing());
        // 80 ms at 48 kHz
        run(&mut env, 3839);
        assert!(!env.is_finished());
        run(&mut env, 1);
        assert!(env.is_finished());
        assert_eq!(env.level(), 0.0);
    }

    #[test]
    fn release_during_attack_starts_from_current_level() {
        let mut env = Envelope::new(EnvelopeShape::HELD, SR);
        env.gate_on();
        let out = run(&mut env, 1200);
        let at_release = *out.last().unwrap();
        assert!(at_release > 0.4 && at_release < 0.6);
        env.gate_off();
        let tail = run(&mut env, 10);
        assert!(tail[0] < at_release && tail[0] > at_release - 0.01);
    }

    #[test]
    fn stays_in_range() {
        let mut env = Envelope::new(EnvelopeShape::PLUCK, SR);
        env.gate_on();
        for s in run(&mut env, 20_000) {
            assert!((0.0..=1.0 + 1e-9).contains(&s), "out of range: {s}");
        }
        env.gate_off();
        for s in run(&mut env, 30_000) {
            assert!((-1e-9..=1.0).contains(&s), "out of range after release: {s}");
        }
        assert!(env.is_finished());
    }

    #[test]
    fn zero_release_stops_on_next_sample() {
        let mut env = Envelope::new(EnvelopeShape::HELD, SR);
        env.gate_on();
        run(&mut env, 10);
        env.release_over(0.0);
        assert_eq!(env.next_sample(), 0.0);
        assert!(env.is_finished());
    }
}
