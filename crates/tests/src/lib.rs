//! Shared signal generators for the Gainstage integration tests

use gainstage_core::domain::audio::ProcessSpec;
use gainstage_core::domain::buffer::AudioBuffer;
use gainstage_core::domain::stage::GainStage;

pub const SAMPLE_RATE: f64 = 48000.0;
pub const BLOCK_SIZE: usize = 512;

pub fn generate_sine_wave(frequency: f32, amplitude: f32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| 2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE as f32)
        .map(|phase| amplitude * phase.sin())
        .collect()
}

pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// Buffer with the same samples on every channel
pub fn block_of(samples: &[f32], num_channels: usize) -> AudioBuffer {
    AudioBuffer::from_channels(vec![samples.to_vec(); num_channels])
}

/// Constant-valued block of `BLOCK_SIZE` frames
pub fn constant_block(value: f32, num_channels: usize) -> AudioBuffer {
    block_of(&vec![value; BLOCK_SIZE], num_channels)
}

/// Default stage prepared for 48 kHz, 512-frame blocks
pub fn prepared_stage(num_channels: usize) -> GainStage {
    let mut stage = GainStage::default();
    stage
        .prepare(ProcessSpec::new(SAMPLE_RATE, BLOCK_SIZE, num_channels))
        .expect("test stage failed to prepare");
    stage
}
