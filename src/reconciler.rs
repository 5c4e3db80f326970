//! Voice reconciler: keeps sounding voices in step with the enabled set.
//!
//! Each body owns at most one voice, either `Stopped` or `Sounding`. A
//! fixed-period [`VoiceReconciler::pass`] compares what should sound with
//! what the reconciler started and with what the audio graph reports, and
//! repairs drift in two tiers:
//!
//! 1. a body whose voice mismatches on `fault_threshold` consecutive passes
//!    gets a targeted rebuild (dispose + recreate that voice only);
//! 2. `system_fault_threshold` consecutive passes containing any fault
//!    trigger a full rebuild of the graph and every voice.
//!
//! A full rebuild that fails leaves live mode on but silent; every later
//! pass retries it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::bodies::BodyId;
use crate::graph::AudioGraph;

/// Timing and threshold settings of the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Period of the reconciliation driver.
    #[serde(default = "ReconcilerConfig::default_period_ms")]
    pub period_ms: f64,
    /// Consecutive mismatching passes before a targeted rebuild.
    #[serde(default = "ReconcilerConfig::default_fault_threshold")]
    pub fault_threshold: u32,
    /// Consecutive faulted passes before a full rebuild.
    #[serde(default = "ReconcilerConfig::default_system_fault_threshold")]
    pub system_fault_threshold: u32,
    #[serde(default = "ReconcilerConfig::default_gain_ramp_ms")]
    pub gain_ramp_ms: f64,
    /// Release time when a single body stops.
    #[serde(default = "ReconcilerConfig::default_release_ms")]
    pub release_ms: f64,
    #[serde(default = "ReconcilerConfig::default_frequency_abs_threshold_hz")]
    pub frequency_abs_threshold_hz: f64,
    #[serde(default = "ReconcilerConfig::default_frequency_rel_threshold")]
    pub frequency_rel_threshold: f64,
    #[serde(default = "ReconcilerConfig::default_gain_threshold")]
    pub gain_threshold: f64,
}

impl ReconcilerConfig {
    fn default_period_ms() -> f64 {
        50.0
    }
    fn default_fault_threshold() -> u32 {
        2
    }
    fn default_system_fault_threshold() -> u32 {
        4
    }
    fn default_gain_ramp_ms() -> f64 {
        50.0
    }
    fn default_release_ms() -> f64 {
        80.0
    }
    fn default_frequency_abs_threshold_hz() -> f64 {
        0.01
    }
    fn default_frequency_rel_threshold() -> f64 {
        1e-4
    }
    fn default_gain_threshold() -> f64 {
        1e-3
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            period_ms: Self::default_period_ms(),
            fault_threshold: Self::default_fault_threshold(),
            system_fault_threshold: Self::default_system_fault_threshold(),
            gain_ramp_ms: Self::default_gain_ramp_ms(),
            release_ms: Self::default_release_ms(),
            frequency_abs_threshold_hz: Self::default_frequency_abs_threshold_hz(),
            frequency_rel_threshold: Self::default_frequency_rel_threshold(),
            gain_threshold: Self::default_gain_threshold(),
        }
    }
}

/// What one body should be doing right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceTarget {
    pub body: BodyId,
    pub should_sound: bool,
    pub frequency: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoiceStatus {
    Stopped,
    Sounding,
}

#[derive(Debug, Clone, Copy)]
struct VoiceSlot {
    status: VoiceStatus,
    frequency: f64,
    gain: f64,
    /// Consecutive passes on which this body was out of step.
    mismatches: u32,
}

impl VoiceSlot {
    const STOPPED: VoiceSlot = VoiceSlot {
        status: VoiceStatus::Stopped,
        frequency: 0.0,
        gain: 0.0,
        mismatches: 0,
    };
}

/// Outcome of one pass, rebuild or mode change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub started: Vec<BodyId>,
    pub stopped: Vec<BodyId>,
    pub targeted_rebuilds: Vec<BodyId>,
    pub orphans_disposed: Vec<BodyId>,
    pub full_rebuild: bool,
    pub faults: usize,
    pub suspended: bool,
    pub consistent: bool,
}

impl PassReport {
    /// Number of start and stop operations issued.
    pub fn transitions(&self) -> usize {
        self.started.len() + self.stopped.len()
    }

    fn absorb(&mut self, other: PassReport) {
        self.started.extend(other.started);
        self.stopped.extend(other.stopped);
        self.targeted_rebuilds.extend(other.targeted_rebuilds);
        self.orphans_disposed.extend(other.orphans_disposed);
        self.full_rebuild |= other.full_rebuild;
        self.faults += other.faults;
        self.suspended |= other.suspended;
    }
}

/// Running totals since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilerStats {
    pub passes: u64,
    pub starts: u64,
    pub stops: u64,
    pub updates: u64,
    pub targeted_rebuilds: u64,
    pub full_rebuilds: u64,
    pub failed_rebuilds: u64,
    pub orphans_disposed: u64,
}

pub struct VoiceReconciler {
    config: ReconcilerConfig,
    live: bool,
    /// Set when a full rebuild is owed (live-on while suspended, failed rebuild).
    needs_rebuild: bool,
    slots: Vec<VoiceSlot>,
    active: BTreeSet<BodyId>,
    faulted_passes: u32,
    stats: ReconcilerStats,
}

impl VoiceReconciler {
    pub fn new(body_count: usize, config: ReconcilerConfig) -> Self {
        VoiceReconciler {
            config,
            live: false,
            needs_rebuild: false,
            slots: vec![VoiceSlot::STOPPED; body_count],
            active: BTreeSet::new(),
            faulted_passes: 0,
            stats: ReconcilerStats::default(),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ReconcilerConfig) {
        self.config = config;
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Live but without a working graph.
    pub fn is_silent(&self) -> bool {
        self.live && self.needs_rebuild
    }

    pub fn active(&self) -> &BTreeSet<BodyId> {
        &self.active
    }

    pub fn status(&self, body: BodyId) -> VoiceStatus {
        self.slots
            .get(body.0)
            .map_or(VoiceStatus::Stopped, |s| s.status)
    }

    /// Last gain sent to the graph for a sounding body.
    pub fn current_gain(&self, body: BodyId) -> Option<f64> {
        self.slots
            .get(body.0)
            .filter(|s| s.status == VoiceStatus::Sounding)
            .map(|s| s.gain)
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Turn live mode on (full rebuild, then start every target) or off
    /// (release every voice).
    pub fn set_live(
        &mut self,
        on: bool,
        targets: &[VoiceTarget],
        graph: &mut dyn AudioGraph,
    ) -> PassReport {
        if on {
            info!("live mode on");
            self.live = true;
            if graph.ensure_output_ready().is_ready() {
                self.full_rebuild(targets, graph)
            } else {
                debug!("output suspended; rebuild deferred to the next pass");
                self.needs_rebuild = true;
                PassReport {
                    suspended: true,
                    ..PassReport::default()
                }
            }
        } else {
            info!("live mode off");
            self.live = false;
            self.needs_rebuild = false;
            self.faulted_passes = 0;
            let mut report = PassReport::default();
            self.release_all(graph, &mut report);
            report.consistent = self.active.is_empty();
            report
        }
    }

    /// Release every active voice and clear the active set.
    pub fn release_all(&mut self, graph: &mut dyn AudioGraph, report: &mut PassReport) {
        let active: Vec<BodyId> = self.active.iter().copied().collect();
        for body in active {
            self.stop_one(body, graph, report);
        }
    }

    /// Dispose everything and restart every body that should sound.
    pub fn full_rebuild(&mut self, targets: &[VoiceTarget], graph: &mut dyn AudioGraph) -> PassReport {
        let mut report = PassReport {
            full_rebuild: true,
            ..PassReport::default()
        };
        self.active.clear();
        self.slots.fill(VoiceSlot::STOPPED);
        self.faulted_passes = 0;

        if let Err(fault) = graph.rebuild() {
            error!("{fault}; live mode stays on without sound");
            self.stats.failed_rebuilds += 1;
            self.needs_rebuild = true;
            report.faults += 1;
            return report;
        }
        self.needs_rebuild = false;
        self.stats.full_rebuilds += 1;
        info!(bodies = targets.len(), "audio graph rebuilt");

        for target in targets.iter().filter(|t| t.should_sound) {
            self.start_one(target, graph, &mut report);
        }
        report.consistent = self.is_consistent(targets, graph);
        report
    }

    /// One reconciliation pass.
    pub fn pass(&mut self, targets: &[VoiceTarget], graph: &mut dyn AudioGraph) -> PassReport {
        self.stats.passes += 1;
        if !self.live {
            return PassReport {
                consistent: self.active.is_empty(),
                ..PassReport::default()
            };
        }
        if !graph.ensure_output_ready().is_ready() {
            debug!("output suspended; retrying next pass");
            return PassReport {
                suspended: true,
                ..PassReport::default()
            };
        }
        if self.needs_rebuild {
            return self.full_rebuild(targets, graph);
        }

        let mut report = PassReport::default();

        for body in graph.sounding_voices() {
            if !self.active.contains(&body) {
                debug!(%body, "disposing orphaned voice");
                graph.dispose_voice(body);
                report.orphans_disposed.push(body);
                self.stats.orphans_disposed += 1;
            }
        }

        for target in targets {
            self.reconcile_one(target, graph, &mut report);
        }

        if report.faults > 0 {
            self.faulted_passes += 1;
        } else {
            self.faulted_passes = 0;
        }
        if self.faulted_passes >= self.config.system_fault_threshold {
            warn!(
                passes = self.faulted_passes,
                "persistent voice faults; rebuilding the audio graph"
            );
            let rebuild = self.full_rebuild(targets, graph);
            report.absorb(rebuild);
        }

        report.consistent = self.is_consistent(targets, graph);
        report
    }

    /// Bring a single body in line immediately (used by control actions).
    pub fn sync_body(&mut self, target: &VoiceTarget, graph: &mut dyn AudioGraph) -> PassReport {
        let mut report = PassReport::default();
        if !self.live || self.needs_rebuild {
            return report;
        }
        let active = self.active.contains(&target.body);
        if !target.should_sound && active {
            self.stop_one(target.body, graph, &mut report);
        } else if target.should_sound && !active {
            if graph.ensure_output_ready().is_ready() {
                self.start_one(target, graph, &mut report);
            } else {
                report.suspended = true;
            }
        }
        report
    }

    /// Push frequency/gain changes that exceed the update thresholds.
    /// Returns the number of voices updated.
    pub fn update(&mut self, targets: &[VoiceTarget], graph: &mut dyn AudioGraph) -> usize {
        if !self.live || self.needs_rebuild || self.active.is_empty() {
            return 0;
        }
        if !graph.ensure_output_ready().is_ready() {
            return 0;
        }
        let ramp = self.config.gain_ramp_ms / 1000.0;
        let mut updated = 0;
        for target in targets {
            if !target.should_sound || !self.active.contains(&target.body) {
                continue;
            }
            let Some(slot) = self.slots.get(target.body.0).copied() else {
                continue;
            };
            if !self.frequency_changed(slot.frequency, target.frequency)
                && !self.gain_changed(slot.gain, target.gain)
            {
                continue;
            }
            match graph.update_voice(target.body, target.frequency, target.gain, ramp) {
                Ok(()) => {
                    let slot = &mut self.slots[target.body.0];
                    slot.frequency = target.frequency;
                    slot.gain = target.gain;
                    self.stats.updates += 1;
                    updated += 1;
                }
                Err(fault) => {
                    warn!("{fault}");
                    // Verified and repaired by the next pass
                    self.slots[target.body.0].mismatches += 1;
                }
            }
        }
        updated
    }

    /// Whether active == should-sound, every active voice is really
    /// sounding, and the graph holds no voice outside the active set.
    pub fn is_consistent(&self, targets: &[VoiceTarget], graph: &dyn AudioGraph) -> bool {
        let wanted_match = targets.iter().all(|t| {
            let active = self.active.contains(&t.body);
            t.should_sound == active && (!active || graph.is_sounding(t.body))
        });
        wanted_match
            && graph
                .sounding_voices()
                .iter()
                .all(|b| self.active.contains(b))
    }

    fn reconcile_one(&mut self, target: &VoiceTarget, graph: &mut dyn AudioGraph, report: &mut PassReport) {
        let body = target.body;
        let Some(mismatches) = self.slots.get(body.0).map(|s| s.mismatches) else {
            return;
        };
        let threshold = self.config.fault_threshold;

        match (target.should_sound, self.active.contains(&body)) {
            (true, false) => {
                if mismatches >= threshold {
                    self.targeted_rebuild(target, graph, report);
                } else {
                    self.start_one(target, graph, report);
                }
            }
            (false, true) => self.stop_one(body, graph, report),
            (true, true) => {
                if graph.is_sounding(body) {
                    self.slots[body.0].mismatches = 0;
                    return;
                }
                let count = mismatches + 1;
                self.slots[body.0].mismatches = count;
                report.faults += 1;
                debug!(%body, count, "active voice is not sounding");
                if count >= threshold {
                    self.targeted_rebuild(target, graph, report);
                }
            }
            (false, false) => self.slots[body.0].mismatches = 0,
        }
    }

    fn start_one(&mut self, target: &VoiceTarget, graph: &mut dyn AudioGraph, report: &mut PassReport) {
        let body = target.body;
        if body.0 >= self.slots.len() {
            return;
        }
        match graph.start_voice(body, target.frequency, target.gain) {
            Ok(()) => {
                self.active.insert(body);
                self.slots[body.0] = VoiceSlot {
                    status: VoiceStatus::Sounding,
                    frequency: target.frequency,
                    gain: target.gain,
                    mismatches: 0,
                };
                report.started.push(body);
                self.stats.starts += 1;
            }
            Err(fault) => {
                warn!("{fault}");
                self.slots[body.0].mismatches += 1;
                report.faults += 1;
            }
        }
    }

    fn stop_one(&mut self, body: BodyId, graph: &mut dyn AudioGraph, report: &mut PassReport) {
        if let Err(fault) = graph.release_voice(body, self.config.release_ms / 1000.0) {
            warn!("{fault}; disposing instead");
            graph.dispose_voice(body);
        }
        self.active.remove(&body);
        if let Some(slot) = self.slots.get_mut(body.0) {
            *slot = VoiceSlot::STOPPED;
        }
        report.stopped.push(body);
        self.stats.stops += 1;
    }

    fn targeted_rebuild(&mut self, target: &VoiceTarget, graph: &mut dyn AudioGraph, report: &mut PassReport) {
        let body = target.body;
        info!(%body, "rebuilding voice");
        self.stats.targeted_rebuilds += 1;
        report.targeted_rebuilds.push(body);

        graph.dispose_voice(body);
        self.active.remove(&body);
        let mismatches = self.slots[body.0].mismatches;

        match graph.start_voice(body, target.frequency, target.gain) {
            Ok(()) => {
                self.active.insert(body);
                self.slots[body.0] = VoiceSlot {
                    status: VoiceStatus::Sounding,
                    frequency: target.frequency,
                    gain: target.gain,
                    mismatches: 0,
                };
            }
            Err(fault) => {
                warn!("{fault}; voice rebuild failed");
                self.slots[body.0] = VoiceSlot {
                    mismatches: mismatches + 1,
                    ..VoiceSlot::STOPPED
                };
                report.faults += 1;
            }
        }
    }

    fn frequency_changed(&self, old: f64, new: f64) -> bool {
        let threshold = self
            .config
            .frequency_abs_threshold_hz
            .max(old.abs() * self.config.frequency_rel_threshold);
        (new - old).abs() > threshold
    }

    fn gain_changed(&self, old: f64, new: f64) -> bool {
        (new - old).abs() > self.config.gain_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::RecordingGraph;

    fn targets(n: usize, enabled: &[usize]) -> Vec<VoiceTarget> {
        (0..n)
            .map(|i| VoiceTarget {
                body: BodyId(i),
                should_sound: enabled.contains(&i),
                frequency: 220.0 * (i + 1) as f64,
                gain: 0.5,
            })
            .collect()
    }

    fn live(n: usize, enabled: &[usize]) -> (VoiceReconciler, RecordingGraph, Vec<VoiceTarget>) {
        let mut rec = VoiceReconciler::new(n, ReconcilerConfig::default());
        let mut graph = RecordingGraph::new();
        let t = targets(n, enabled);
        rec.set_live(true, &t, &mut graph);
        graph.clear_log();
        (rec, graph, t)
    }

    #[test]
    fn live_on_starts_every_enabled_body() {
        let mut rec = VoiceReconciler::new(5, ReconcilerConfig::default());
        let mut graph = RecordingGraph::new();
        let t = targets(5, &[0, 2, 4]);

        let report = rec.set_live(true, &t, &mut graph);
        assert!(report.full_rebuild);
        assert_eq!(graph.rebuilds, 1);
        assert_eq!(report.started, vec![BodyId(0), BodyId(2), BodyId(4)]);
        assert_eq!(rec.active().len(), 3);
        assert!(report.consistent);

        let report = rec.set_live(false, &t, &mut graph);
        assert_eq!(report.stopped.len(), 3);
        assert!(rec.active().is_empty());
        assert!(graph.voices.is_empty());
        assert_eq!(rec.status(BodyId(2)), VoiceStatus::Stopped);
    }

    #[test]
    fn consistent_state_is_idempotent() {
        let (mut rec, mut graph, t) = live(6, &[1, 3, 5]);
        for _ in 0..5 {
            let report = rec.pass(&t, &mut graph);
            assert_eq!(report.transitions(), 0);
            assert!(report.consistent);
        }
        assert!(graph.starts.is_empty());
        assert!(graph.releases.is_empty());
        assert_eq!(graph.rebuilds, 0);
    }

    #[test]
    fn pass_starts_and_stops_drifted_bodies() {
        let (mut rec, mut graph, mut t) = live(4, &[0, 1]);
        t[1].should_sound = false;
        t[3].should_sound = true;

        let report = rec.pass(&t, &mut graph);
        assert_eq!(report.started, vec![BodyId(3)]);
        assert_eq!(report.stopped, vec![BodyId(1)]);
        assert!(report.consistent);
        assert_eq!(
            rec.active().iter().copied().collect::<Vec<_>>(),
            vec![BodyId(0), BodyId(3)]
        );
    }

    #[test]
    fn lost_voice_gets_one_targeted_rebuild() {
        let (mut rec, mut graph, t) = live(5, &[0, 1, 2]);
        graph.drop_voice(BodyId(1));

        let mut rebuilds = Vec::new();
        for _ in 0..3 {
            let report = rec.pass(&t, &mut graph);
            rebuilds.extend(report.targeted_rebuilds);
            assert!(!report.full_rebuild);
        }
        assert_eq!(rebuilds, vec![BodyId(1)]);
        assert_eq!(RecordingGraph::count(&graph.starts, BodyId(1)), 1);
        for other in [BodyId(0), BodyId(2)] {
            assert_eq!(RecordingGraph::count(&graph.starts, other), 0);
            assert_eq!(RecordingGraph::count(&graph.releases, other), 0);
            assert_eq!(RecordingGraph::count(&graph.disposes, other), 0);
        }
        assert!(rec.is_consistent(&t, &graph));
        assert_eq!(rec.stats().targeted_rebuilds, 1);
    }

    #[test]
    fn orphans_are_disposed() {
        let (mut rec, mut graph, t) = live(4, &[0]);
        graph.inject_voice(BodyId(3));

        let report = rec.pass(&t, &mut graph);
        assert_eq!(report.orphans_disposed, vec![BodyId(3)]);
        assert!(!graph.is_sounding(BodyId(3)));
        assert!(report.consistent);
    }

    #[test]
    fn persistent_faults_escalate_to_full_rebuild() {
        let (mut rec, mut graph, t) = live(3, &[0, 1]);
        graph.fail_start.insert(BodyId(1));
        graph.drop_voice(BodyId(1));

        let mut full = 0;
        for _ in 0..ReconcilerConfig::default().system_fault_threshold {
            if rec.pass(&t, &mut graph).full_rebuild {
                full += 1;
            }
        }
        assert_eq!(full, 1);
        assert_eq!(graph.rebuilds, 1);
        // Healthy body is restarted by the rebuild
        assert!(graph.is_sounding(BodyId(0)));

        // Once the body recovers the next pass heals it
        graph.fail_start.clear();
        for _ in 0..3 {
            rec.pass(&t, &mut graph);
        }
        assert!(rec.is_consistent(&t, &graph));
    }

    #[test]
    fn failed_rebuild_leaves_live_but_silent() {
        let mut rec = VoiceReconciler::new(2, ReconcilerConfig::default());
        let mut graph = RecordingGraph::new();
        graph.fail_rebuild = true;
        let t = targets(2, &[0, 1]);

        let report = rec.set_live(true, &t, &mut graph);
        assert!(report.full_rebuild);
        assert!(rec.is_live());
        assert!(rec.is_silent());
        assert!(graph.voices.is_empty());

        // Still failing: remains silent, no panic
        rec.pass(&t, &mut graph);
        assert!(rec.is_silent());

        graph.fail_rebuild = false;
        let report = rec.pass(&t, &mut graph);
        assert!(report.full_rebuild);
        assert!(!rec.is_silent());
        assert_eq!(rec.active().len(), 2);
        assert_eq!(rec.stats().failed_rebuilds, 2);
    }

    #[test]
    fn suspended_output_defers_work() {
        let mut rec = VoiceReconciler::new(3, ReconcilerConfig::default());
        let mut graph = RecordingGraph::new();
        graph.suspended = true;
        let t = targets(3, &[0, 1, 2]);

        let report = rec.set_live(true, &t, &mut graph);
        assert!(report.suspended);
        assert!(rec.active().is_empty());
        assert!(rec.pass(&t, &mut graph).suspended);

        graph.suspended = false;
        let report = rec.pass(&t, &mut graph);
        assert!(report.full_rebuild);
        assert_eq!(rec.active().len(), 3);
    }

    #[test]
    fn updates_respect_thresholds() {
        let (mut rec, mut graph, mut t) = live(2, &[0, 1]);

        // Below both thresholds
        t[0].frequency += 0.001;
        t[1].gain += 0.0001;
        assert_eq!(rec.update(&t, &mut graph), 0);

        t[0].frequency += 5.0;
        assert_eq!(rec.update(&t, &mut graph), 1);
        assert_eq!(graph.updates, vec![BodyId(0)]);
        assert_eq!(graph.voices[&BodyId(0)].0, t[0].frequency);

        t[1].gain = 0.8;
        assert_eq!(rec.update(&t, &mut graph), 1);
        assert_eq!(graph.voices[&BodyId(1)].1, 0.8);
        // The other body's gain stage is untouched
        assert_eq!(graph.voices[&BodyId(0)].1, 0.5);
        assert_eq!(rec.current_gain(BodyId(1)), Some(0.8));
    }

    #[test]
    fn sync_body_acts_immediately() {
        let (mut rec, mut graph, mut t) = live(3, &[0]);
        t[2].should_sound = true;
        let report = rec.sync_body(&t[2], &mut graph);
        assert_eq!(report.started, vec![BodyId(2)]);

        t[0].should_sound = false;
        let report = rec.sync_body(&t[0], &mut graph);
        assert_eq!(report.stopped, vec![BodyId(0)]);
        assert!(rec.pass(&t, &mut graph).consistent);
    }

    #[test]
    fn not_live_does_nothing() {
        let mut rec = VoiceReconciler::new(3, ReconcilerConfig::default());
        let mut graph = RecordingGraph::new();
        let t = targets(3, &[0, 1, 2]);
        let report = rec.pass(&t, &mut graph);
        assert_eq!(report.transitions(), 0);
        assert_eq!(rec.update(&t, &mut graph), 0);
        assert!(graph.voices.is_empty());
    }
}
