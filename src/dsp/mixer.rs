//! Mixer: sums voice outputs, then applies the master level and a soft clip.

use super::param::RampedParam;

#[derive(Debug, Clone)]
pub struct Mixer {
    pub master: RampedParam,
    buffer: Vec<f64>,
}

impl Mixer {
    pub fn new(master_gain: f64) -> Self {
        Mixer {
            master: RampedParam::new(master_gain),
            buffer: Vec::new(),
        }
    }

    /// Zero the accumulation buffer for a block of `num_samples`.
    pub fn clear(&mut self, num_samples: usize) {
        self.buffer.clear();
        self.buffer.resize(num_samples, 0.0);
    }

    pub fn add(&mut self, index: usize, sample: f64) {
        if let Some(slot) = self.buffer.get_mut(index) {
            *slot += sample;
        }
    }

    /// Write the mixed block into `out`, advancing the master ramp once per sample.
    pub fn write_output(&mut self, out: &mut [f32]) {
        for (dst, &sum) in out.iter_mut().zip(self.buffer.iter()) {
            *dst = soft_clip(sum * self.master.next_value()) as f32;
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

fn soft_clip(x: f64) -> f64 {
    x.tanh()
}
