//! Sequence player: one note per enabled body, one beat each, in table order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bodies::BodyId;
use crate::error::ConfigError;

/// Tolerance for comparing accumulated frame times with beat boundaries.
const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default = "SequenceConfig::default_tempo_bpm")]
    pub tempo_bpm: f64,
    #[serde(default)]
    pub looping: bool,
}

impl SequenceConfig {
    fn default_tempo_bpm() -> f64 {
        80.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_tempo(self.tempo_bpm)
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        SequenceConfig {
            tempo_bpm: Self::default_tempo_bpm(),
            looping: false,
        }
    }
}

pub fn validate_tempo(tempo_bpm: f64) -> Result<(), ConfigError> {
    if tempo_bpm > 0.0 && tempo_bpm <= 600.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidSetting {
            field: "sequence.tempo_bpm",
            reason: format!("must be in (0, 600], got {tempo_bpm}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SequenceState {
    Idle,
    Playing,
    Finished,
}

/// One scheduled tone. Times are seconds from the start of the pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledNote {
    pub body: BodyId,
    pub start: f64,
    pub duration: f64,
    pub frequency: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SequenceEvent {
    Note(ScheduledNote),
    Looped,
    Finished,
}

/// A tone to schedule: body, mean frequency, gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceTone {
    pub body: BodyId,
    pub frequency: f64,
    pub gain: f64,
}

/// Lay out one note per tone, one beat long and one beat apart.
pub fn schedule(tones: &[SequenceTone], tempo_bpm: f64) -> Vec<ScheduledNote> {
    let beat = 60.0 / tempo_bpm;
    tones
        .iter()
        .enumerate()
        .map(|(i, tone)| ScheduledNote {
            body: tone.body,
            start: i as f64 * beat,
            duration: beat,
            frequency: tone.frequency,
            gain: tone.gain,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SequencePlayer {
    pub tempo_bpm: f64,
    pub looping: bool,
    state: SequenceState,
    notes: Vec<ScheduledNote>,
    next: usize,
    cursor: f64,
    loops: u32,
}

impl SequencePlayer {
    pub fn new(config: SequenceConfig) -> Self {
        SequencePlayer {
            tempo_bpm: config.tempo_bpm,
            looping: config.looping,
            state: SequenceState::Idle,
            notes: Vec::new(),
            next: 0,
            cursor: 0.0,
            loops: 0,
        }
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SequenceState::Playing
    }

    pub fn notes(&self) -> &[ScheduledNote] {
        &self.notes
    }

    pub fn loops(&self) -> u32 {
        self.loops
    }

    /// Length of one pass in seconds.
    pub fn total_duration(&self) -> f64 {
        self.notes
            .last()
            .map_or(0.0, |n| n.start + n.duration)
    }

    /// Position within the current pass, in [0, 1].
    pub fn progress(&self) -> f64 {
        let total = self.total_duration();
        if total > 0.0 {
            (self.cursor / total).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Body whose note is sounding at the cursor.
    pub fn now_playing(&self) -> Option<BodyId> {
        if !self.is_playing() {
            return None;
        }
        self.notes
            .iter()
            .rev()
            .find(|n| n.start <= self.cursor + TIME_EPSILON && self.cursor < n.start + n.duration)
            .map(|n| n.body)
    }

    /// Replace any previous schedule and start from the top.
    pub fn start(&mut self, tones: &[SequenceTone]) {
        self.notes = schedule(tones, self.tempo_bpm);
        self.next = 0;
        self.cursor = 0.0;
        self.loops = 0;
        self.state = if self.notes.is_empty() {
            SequenceState::Finished
        } else {
            SequenceState::Playing
        };
    }

    /// Cancel pending notes and return to idle.
    pub fn stop(&mut self) {
        self.notes.clear();
        self.next = 0;
        self.cursor = 0.0;
        self.state = SequenceState::Idle;
    }

    /// Advance by `dt` seconds and return every event that became due.
    ///
    /// When a looping pass completes, `reschedule` supplies the tones of the
    /// next pass so it follows the current enabled set and tempo.
    pub fn advance(
        &mut self,
        dt: f64,
        mut reschedule: impl FnMut() -> Vec<SequenceTone>,
    ) -> Vec<SequenceEvent> {
        let mut events = Vec::new();
        if !self.is_playing() {
            return events;
        }
        self.cursor += dt.max(0.0);

        // A stall spanning a whole extra pass makes the rest of this pass stale
        let total = self.total_duration();
        if self.looping && self.cursor >= 2.0 * total {
            self.next = self.notes.len();
        }

        loop {
            while let Some(note) = self.notes.get(self.next) {
                if note.start > self.cursor + TIME_EPSILON {
                    break;
                }
                events.push(SequenceEvent::Note(*note));
                self.next += 1;
            }

            let total = self.total_duration();
            if self.cursor + TIME_EPSILON < total {
                break;
            }

            if self.looping {
                let mut overshoot = (self.cursor - total).max(0.0);
                self.notes = schedule(&reschedule(), self.tempo_bpm);
                self.next = 0;
                self.loops += 1;
                events.push(SequenceEvent::Looped);
                if self.notes.is_empty() {
                    self.cursor = 0.0;
                    self.state = SequenceState::Finished;
                    events.push(SequenceEvent::Finished);
                    break;
                }
                let pass = self.total_duration();
                if overshoot + TIME_EPSILON >= pass {
                    let skipped = ((overshoot + TIME_EPSILON) / pass).floor();
                    debug!(skipped, "skipping stale sequence passes");
                    self.loops += skipped as u32;
                    overshoot = (overshoot - skipped * pass).max(0.0);
                }
                self.cursor = overshoot;
            } else {
                self.cursor = total;
                self.state = SequenceState::Finished;
                events.push(SequenceEvent::Finished);
                break;
            }
        }
        events
    }
}
