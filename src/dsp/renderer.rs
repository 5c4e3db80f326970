//! Offline renderer: plays one pass of the sequence through a [`SynthGraph`]
//! and encodes the result as a WAV byte buffer.

use tracing::debug;

use super::graph::SynthGraph;
use crate::bodies::Body;
use crate::config::EngineConfig;
use crate::engine::OrbitalEngine;
use crate::error::SonificationError;

const BLOCK_SIZE: usize = 128;

/// Seconds rendered past the last note so release tails can ring out.
const TAIL_ALLOWANCE: f64 = 2.0;

/// Render one non-looping pass of the sequence to mono f32 samples.
pub fn render_sequence(
    mut config: EngineConfig,
    bodies: Vec<Body>,
    sample_rate: u32,
) -> Result<Vec<f32>, SonificationError> {
    config.sequence.looping = false;
    config.audio.sample_rate = sample_rate;
    let mut graph = SynthGraph::new(sample_rate as f64);
    graph.resume_output();

    let mut engine = OrbitalEngine::new(config, bodies, graph)?;
    engine.start_sequence()?;

    let sr = sample_rate as f64;
    let max_samples = ((engine.sequence().total_duration() + TAIL_ALLOWANCE) * sr) as usize;
    let block_dt = BLOCK_SIZE as f64 / sr;
    let mut samples = Vec::with_capacity(max_samples);
    let mut block = [0.0f32; BLOCK_SIZE];

    while samples.len() < max_samples {
        engine.graph_mut().render(&mut block);
        samples.extend_from_slice(&block);
        engine.advance(block_dt);
        if !engine.sequence().is_playing() && engine.graph().is_idle() {
            break;
        }
    }
    debug!(samples = samples.len(), "sequence rendered");
    Ok(samples)
}

/// Render one pass of the sequence to a 16-bit mono WAV file.
pub fn render_sequence_wav(
    config: EngineConfig,
    bodies: Vec<Body>,
    sample_rate: u32,
) -> Result<Vec<u8>, SonificationError> {
    let samples = render_sequence(config, bodies, sample_rate)?;
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    Ok(encode_wav(&pcm, sample_rate, 1))
}

/// Encode interleaved 16-bit PCM as a RIFF/WAVE buffer.
fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    const BITS: u16 = 16;
    let block_align = channels * BITS / 8;
    let data_len = (samples.len() * 2) as u32;

    let mut fmt = Vec::with_capacity(16);
    fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    fmt.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
    fmt.extend_from_slice(&block_align.to_le_bytes());
    fmt.extend_from_slice(&BITS.to_le_bytes());

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    write_chunk(&mut out, b"fmt ", &fmt);
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

fn write_chunk(out: &mut Vec<u8>, id: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
}
