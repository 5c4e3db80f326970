//! Linearly ramped control parameter (gain stages, master level).

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampedParam {
    value: f64,
    target: f64,
    step: f64,
    remaining: usize,
}

impl RampedParam {
    pub fn new(value: f64) -> Self {
        RampedParam {
            value,
            target: value,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Jump to `value`, cancelling any ramp in progress.
    pub fn set(&mut self, value: f64) {
        self.value = value;
        self.target = value;
        self.step = 0.0;
        self.remaining = 0;
    }

    /// Move linearly from the current value to `target` over `samples`.
    pub fn ramp_to(&mut self, target: f64, samples: usize) {
        if samples == 0 {
            self.set(target);
            return;
        }
        self.target = target;
        self.step = (target - self.value) / samples as f64;
        self.remaining = samples;
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining > 0
    }

    /// Current value, then advance one sample.
    pub fn next_value(&mut self) -> f64 {
        let out = self.value;
        if self.remaining > 0 {
            self.remaining -= 1;
            self.value = if self.remaining == 0 {
                self.target
            } else {
                self.value + self.step
            };
        }
        out
    }
}

/// Seconds to a whole number of samples.
pub fn seconds_to_samples(seconds: f64, sample_rate: f64) -> usize {
    (seconds.max(0.0) * sample_rate).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_lands_exactly_on_target() {
        let mut p = RampedParam::new(0.0);
        p.ramp_to(1.0, 4);
        let values: Vec<f64> = (0..6).map(|_| p.next_value()).collect();
        assert_eq!(values[0], 0.0);
        assert!((values[2] - 0.5).abs() < 1e-12);
        assert_eq!(values[4], 1.0);
        assert_eq!(values[5], 1.0);
        assert!(!p.is_ramping());
    }

    #[test]
    fn set_cancels_ramp() {
        let mut p = RampedParam::new(1.0);
        p.ramp_to(0.0, 100);
        p.next_value();
        p.set(0.25);
        assert!(!p.is_ramping());
        assert_eq!(p.next_value(), 0.25);
        assert_eq!(p.target(), 0.25);
    }

    #[test]
    fn zero_length_ramp_is_immediate() {
        let mut p = RampedParam::new(0.2);
        p.ramp_to(0.9, 0);
        assert_eq!(p.value(), 0.9);
    }

    #[test]
    fn converts_seconds() {
        assert_eq!(seconds_to_samples(0.05, 48_000.0), 2400);
        assert_eq!(seconds_to_samples(-1.0, 48_000.0), 0);
    }
}
