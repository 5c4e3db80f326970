//! DSP: sample-level synthesis behind the [`crate::graph::AudioGraph`] seam.
//!
//! The same graph feeds the host's audio callback (via [`graph::SynthGraph::render`])
//! and the offline WAV renderer.

pub mod envelope;
pub mod graph;
pub mod mixer;
pub mod oscillator;
pub mod param;
pub mod renderer;
pub mod voice;
