//! Orbital engine: owns every piece of state, runs the animation and
//! reconciliation drivers, and handles control actions.
//!
//! All methods take `&mut self` and run to completion, so the two drivers
//! and the controls never touch a voice concurrently.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bodies::{Body, BodyDiff, BodyId, BodySet, BodyState, DistanceModel, solar_system};
use crate::config::{EngineConfig, require_non_negative, require_positive};
use crate::error::{ConfigError, SonificationError};
use crate::frequency::FrequencyMapper;
use crate::gain::{GainConfig, gain};
use crate::graph::AudioGraph;
use crate::master::MasterBus;
use crate::orbit::{OrbitModel, OrbitSample, OrbitState, PositionOverride, position};
use crate::reconciler::{PassReport, ReconcilerStats, VoiceReconciler, VoiceTarget};
use crate::sequence::{SequenceEvent, SequencePlayer, SequenceState, SequenceTone, validate_tempo};

/// Upper bound on reconciliation passes run by one `advance` call.
const MAX_PASSES_PER_ADVANCE: usize = 8;

/// Renderer-facing values of one body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyReadout {
    pub id: BodyId,
    pub name: String,
    pub enabled: bool,
    pub sounding: bool,
    pub angle: f64,
    pub distance: f64,
    pub x: f64,
    pub y: f64,
    pub mean_frequency: f64,
    pub frequency: f64,
    pub gain: f64,
    pub display_radius: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub version: u64,
    pub elapsed: f64,
    pub paused: bool,
    pub live: bool,
    /// Live but waiting for a successful rebuild.
    pub silent: bool,
    pub distance_model: DistanceModel,
    pub base_frequency: f64,
    pub speed: f64,
    pub master_volume: f64,
    pub master_db: f64,
    pub sequence_state: SequenceState,
    pub now_playing: Option<BodyId>,
    pub sequence_progress: f64,
    pub bodies: Vec<BodyReadout>,
    pub stats: ReconcilerStats,
}

/// Mean-frequency tones of every enabled body, in table order.
pub fn sequence_tones(
    bodies: &BodySet,
    mapper: &FrequencyMapper,
    gain_config: &GainConfig,
) -> Vec<SequenceTone> {
    bodies
        .enabled()
        .map(|s| {
            let frequency = mapper.mean_frequency(&s.body);
            SequenceTone {
                body: s.id,
                frequency,
                gain: gain(frequency, gain_config),
            }
        })
        .collect()
}

pub struct OrbitalEngine<G: AudioGraph> {
    config: EngineConfig,
    bodies: BodySet,
    orbit_model: OrbitModel,
    orbit: OrbitState,
    mapper: FrequencyMapper,
    reconciler: VoiceReconciler,
    sequence: SequencePlayer,
    master: MasterBus,
    graph: G,
    /// Wall time not yet consumed by reconciliation passes.
    reconcile_debt: f64,
    shut_down: bool,
}

impl<G: AudioGraph> OrbitalEngine<G> {
    pub fn new(config: EngineConfig, bodies: Vec<Body>, mut graph: G) -> Result<Self, ConfigError> {
        config.validate()?;
        let bodies = BodySet::new(bodies)?;
        let master = MasterBus::new(config.audio.master_volume, config.audio.master_ramp_ms);
        master.apply(&mut graph);
        info!(bodies = bodies.len(), "orbital engine ready");
        Ok(OrbitalEngine {
            orbit_model: OrbitModel::new(config.orbit.time_scale),
            orbit: OrbitState::new(config.orbit.speed, config.audio.distance_model),
            mapper: FrequencyMapper::new(config.audio.base_frequency, config.audio.distance_model),
            reconciler: VoiceReconciler::new(bodies.len(), config.reconciler),
            sequence: SequencePlayer::new(config.sequence),
            master,
            bodies,
            graph,
            config,
            reconcile_debt: 0.0,
            shut_down: false,
        })
    }

    /// Engine over the built-in solar-system table.
    pub fn with_solar_system(config: EngineConfig, graph: G) -> Result<Self, ConfigError> {
        Self::new(config, solar_system(), graph)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bodies(&self) -> &BodySet {
        &self.bodies
    }

    pub fn orbit(&self) -> &OrbitState {
        &self.orbit
    }

    pub fn reconciler(&self) -> &VoiceReconciler {
        &self.reconciler
    }

    pub fn sequence(&self) -> &SequencePlayer {
        &self.sequence
    }

    pub fn master(&self) -> &MasterBus {
        &self.master
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn speed_factor(&self) -> f64 {
        if self.config.orbit.couple_speed_to_base_frequency {
            self.mapper.base_frequency / 220.0
        } else {
            1.0
        }
    }

    fn target(&self, state: &BodyState, sample: OrbitSample) -> VoiceTarget {
        let frequency = self.mapper.instantaneous_frequency(&state.body, sample.distance);
        VoiceTarget {
            body: state.id,
            should_sound: state.enabled && !self.orbit.paused,
            frequency,
            gain: gain(frequency, &self.config.gain),
        }
    }

    fn target_for(&self, id: BodyId) -> Option<VoiceTarget> {
        self.targets().into_iter().find(|t| t.body == id)
    }

    /// What every body should be doing right now.
    pub fn targets(&self) -> Vec<VoiceTarget> {
        let samples = self.orbit_model.sample(&self.bodies, self.orbit.distance_model);
        self.bodies
            .iter()
            .zip(samples)
            .map(|(s, sample)| self.target(s, sample))
            .collect()
    }

    /// Run the animation and reconciliation drivers for `wall_dt` seconds of
    /// wall time. Returns the number of reconciliation passes run.
    pub fn advance(&mut self, wall_dt: f64) -> usize {
        if self.shut_down {
            return 0;
        }
        let dt = if wall_dt.is_finite() { wall_dt.max(0.0) } else { 0.0 };
        self.frame(dt);

        let period = self.reconciler.config().period_ms / 1000.0;
        self.reconcile_debt += dt;
        let mut passes = 0;
        while self.reconcile_debt >= period && passes < MAX_PASSES_PER_ADVANCE {
            self.reconcile();
            self.reconcile_debt -= period;
            passes += 1;
        }
        if passes == MAX_PASSES_PER_ADVANCE && self.reconcile_debt >= period {
            debug!(skipped = self.reconcile_debt / period, "dropping stale reconciliation passes");
            self.reconcile_debt = 0.0;
        }
        passes
    }

    /// One animation tick: move the bodies, push frequency/gain changes to
    /// the sounding voices and play any sequence notes that came due.
    pub fn frame(&mut self, dt: f64) {
        if self.shut_down {
            return;
        }
        let speed_factor = self.speed_factor();
        if let Some(angles) = self
            .orbit_model
            .step(&self.bodies, &mut self.orbit, dt, speed_factor)
        {
            self.bodies.apply_orbit(&angles);
        }

        if self.reconciler.is_live() {
            let targets = self.targets();
            self.reconciler.update(&targets, &mut self.graph);
        }

        if self.sequence.is_playing() {
            let (bodies, mapper, gain_config) = (&self.bodies, &self.mapper, &self.config.gain);
            let events = self
                .sequence
                .advance(dt, || sequence_tones(bodies, mapper, gain_config));
            self.dispatch(events);
        }
    }

    /// One reconciliation pass.
    pub fn reconcile(&mut self) -> PassReport {
        if self.shut_down {
            return PassReport::default();
        }
        let targets = self.targets();
        let report = self.reconciler.pass(&targets, &mut self.graph);
        self.after_rebuild(&report);
        report
    }

    fn after_rebuild(&mut self, report: &PassReport) {
        // A rebuild recreates the output stage, so the level is written again
        if report.full_rebuild && !self.reconciler.is_silent() {
            self.master.apply(&mut self.graph);
        }
    }

    fn dispatch(&mut self, events: Vec<SequenceEvent>) {
        for event in events {
            match event {
                SequenceEvent::Note(note) => {
                    if !self.graph.ensure_output_ready().is_ready() {
                        debug!(body = %note.body, "output suspended; note skipped");
                        continue;
                    }
                    if let Err(fault) =
                        self.graph
                            .play_note(note.body, note.frequency, note.gain, note.duration)
                    {
                        warn!("{fault}");
                    }
                }
                SequenceEvent::Looped => debug!(loops = self.sequence.loops(), "sequence looped"),
                SequenceEvent::Finished => info!("sequence finished"),
            }
        }
    }

    fn touch_output(&mut self) {
        self.graph.ensure_output_ready();
    }

    fn sync(&mut self, diff: Option<BodyDiff>) -> Option<BodyDiff> {
        let diff = diff?;
        if diff.changed() && self.reconciler.is_live() {
            if let Some(target) = self.target_for(diff.id) {
                self.reconciler.sync_body(&target, &mut self.graph);
            }
        }
        Some(diff)
    }

    pub fn set_enabled(&mut self, id: BodyId, enabled: bool) -> Option<BodyDiff> {
        self.touch_output();
        let diff = self.bodies.set_enabled(id, enabled);
        self.sync(diff)
    }

    pub fn toggle(&mut self, id: BodyId) -> Option<BodyDiff> {
        self.touch_output();
        let diff = self.bodies.toggle(id);
        self.sync(diff)
    }

    pub fn set_enabled_by_name(&mut self, name: &str, enabled: bool) -> Option<BodyDiff> {
        let id = self.bodies.find(name)?.id;
        self.set_enabled(id, enabled)
    }

    /// Pausing stops the orbit and silences every live voice; resuming
    /// restarts the enabled bodies.
    pub fn set_paused(&mut self, paused: bool) {
        self.touch_output();
        if self.orbit.paused == paused {
            return;
        }
        self.orbit.paused = paused;
        info!(paused, "orbit pause changed");
        if !self.reconciler.is_live() {
            return;
        }
        if paused {
            let mut report = PassReport::default();
            self.reconciler.release_all(&mut self.graph, &mut report);
        } else {
            self.reconcile();
        }
    }

    /// Jump every body to a named orbital position on the next frame.
    pub fn trigger_position(&mut self, position: PositionOverride) {
        self.touch_output();
        debug!(?position, "position override queued");
        self.orbit.pending_override = Some(position);
    }

    pub fn set_base_frequency(&mut self, base_frequency: f64) -> Result<(), ConfigError> {
        require_positive("audio.base_frequency", base_frequency)?;
        self.touch_output();
        self.mapper.base_frequency = base_frequency;
        self.config.audio.base_frequency = base_frequency;
        Ok(())
    }

    pub fn set_distance_model(&mut self, model: DistanceModel) {
        self.touch_output();
        self.mapper.distance_model = model;
        self.orbit.distance_model = model;
        self.config.audio.distance_model = model;
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), ConfigError> {
        require_non_negative("orbit.speed", speed)?;
        self.orbit.speed = speed;
        self.config.orbit.speed = speed;
        Ok(())
    }

    /// Set the master level. Returns the clamped value.
    pub fn set_master_volume(&mut self, volume: f64) -> f64 {
        let volume = self.master.set_volume(volume, &mut self.graph);
        self.config.audio.master_volume = volume;
        volume
    }

    /// Live mode and the sequence are mutually exclusive; turning live mode
    /// on stops any sequence.
    pub fn set_live_mode(&mut self, on: bool) -> PassReport {
        self.touch_output();
        if on && self.sequence.state() != SequenceState::Idle {
            self.stop_sequence();
        }
        let targets = self.targets();
        let report = self.reconciler.set_live(on, &targets, &mut self.graph);
        self.after_rebuild(&report);
        report
    }

    /// Tear down any previous sequence, leave live mode and play the
    /// enabled bodies one beat each.
    pub fn start_sequence(&mut self) -> Result<SequenceState, SonificationError> {
        self.touch_output();
        if self.reconciler.is_live() {
            self.set_live_mode(false);
        }
        self.sequence.stop();
        self.graph.cancel_notes();
        if let Err(fault) = self.graph.rebuild_instrument() {
            error!("{fault}");
            return Err(fault.into());
        }

        let tones = sequence_tones(&self.bodies, &self.mapper, &self.config.gain);
        info!(notes = tones.len(), tempo = self.sequence.tempo_bpm, "sequence started");
        self.sequence.start(&tones);
        // The first note is due immediately
        let events = self.sequence.advance(0.0, Vec::new);
        self.dispatch(events);
        Ok(self.sequence.state())
    }

    pub fn stop_sequence(&mut self) {
        self.touch_output();
        self.sequence.stop();
        self.graph.cancel_notes();
    }

    /// Takes effect from the next sequence pass.
    pub fn set_tempo(&mut self, tempo_bpm: f64) -> Result<(), ConfigError> {
        validate_tempo(tempo_bpm)?;
        self.sequence.tempo_bpm = tempo_bpm;
        self.config.sequence.tempo_bpm = tempo_bpm;
        Ok(())
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.sequence.looping = looping;
        self.config.sequence.looping = looping;
    }

    pub fn set_gain_config(&mut self, gain_config: GainConfig) -> Result<(), ConfigError> {
        gain_config.validate()?;
        self.config.gain = gain_config;
        Ok(())
    }

    /// Release everything and stop both drivers for good.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.sequence.stop();
        self.graph.cancel_notes();
        let targets = self.targets();
        self.reconciler.set_live(false, &targets, &mut self.graph);
        self.shut_down = true;
        info!("orbital engine shut down");
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let samples = self.orbit_model.sample(&self.bodies, self.orbit.distance_model);
        let bodies = self
            .bodies
            .iter()
            .zip(samples)
            .map(|(s, sample)| {
                let frequency = self.mapper.instantaneous_frequency(&s.body, sample.distance);
                let (x, y) = position(sample);
                BodyReadout {
                    id: s.id,
                    name: s.body.name.clone(),
                    enabled: s.enabled,
                    sounding: self.graph.is_sounding(s.id),
                    angle: sample.angle,
                    distance: sample.distance,
                    x,
                    y,
                    mean_frequency: self.mapper.mean_frequency(&s.body),
                    frequency,
                    // A sounding voice reports the level it was last sent
                    gain: self
                        .reconciler
                        .current_gain(s.id)
                        .unwrap_or_else(|| gain(frequency, &self.config.gain)),
                    display_radius: s.body.display_radius,
                    color: s.body.color.clone(),
                }
            })
            .collect();

        EngineSnapshot {
            version: self.bodies.version(),
            elapsed: self.orbit.elapsed,
            paused: self.orbit.paused,
            live: self.reconciler.is_live(),
            silent: self.reconciler.is_silent(),
            distance_model: self.orbit.distance_model,
            base_frequency: self.mapper.base_frequency,
            speed: self.orbit.speed,
            master_volume: self.master.volume(),
            master_db: self.master.decibels(),
            sequence_state: self.sequence.state(),
            now_playing: self.sequence.now_playing(),
            sequence_progress: self.sequence.progress(),
            bodies,
            stats: self.reconciler.stats(),
        }
    }
}
