//! Digital Signal Processing for the gain stage
//!
//! This module provides:
//! - The per-sample gain and soft-clipping processor
//! - Decibel conversion helpers shared with the metering code
//!
//! Everything here is designed for:
//! - Zero allocations in the hot path
//! - No locking and no panics on any input
//! - Bounded time proportional to channels x samples

use crate::domain::buffer::AudioBuffer;

/// Level reported for silence, for an invalid channel and for anything quieter
pub const SILENCE_FLOOR_DB: f32 = -100.0;

// ============================================================================
// DECIBEL CONVERSION
// ============================================================================

/// Convert linear gain to decibels, never going below `floor_db`
///
/// Zero, negative and NaN gains map to the floor.
#[inline]
pub fn gain_to_db(gain: f32, floor_db: f32) -> f32 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(floor_db)
    } else {
        floor_db
    }
}

/// Convert decibels to linear gain; anything at or below `floor_db` is silence
#[inline]
pub fn db_to_gain(db: f32, floor_db: f32) -> f32 {
    if db > floor_db {
        10.0_f32.powf(db / 20.0)
    } else {
        0.0
    }
}

// ============================================================================
// SIGNAL PROCESSOR
// ============================================================================

/// Gain followed by optional tanh soft clipping, applied in place
///
/// The processor holds no state: gain and clipping arrive with every call from
/// whoever owns the parameters. Gain is multiplied in first and the clipper
/// sees the gained signal, which is what gives the knee its shape. Gain values
/// are not validated here, so negative, infinite or NaN gains simply follow
/// IEEE multiplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalProcessor;

impl SignalProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(sample: f32, gain: f32, clipping_enabled: bool) -> f32 {
        let gained = sample * gain;
        if clipping_enabled {
            gained.tanh()
        } else {
            gained
        }
    }

    /// Process every active sample of every channel in place
    ///
    /// An empty buffer (no channels or no samples) is left untouched.
    pub fn process(&self, buffer: &mut AudioBuffer, gain: f32, clipping_enabled: bool) {
        if buffer.is_empty() {
            return;
        }

        // Branch once per block rather than once per sample
        if clipping_enabled {
            for channel in buffer.channels_mut() {
                for sample in channel.iter_mut() {
                    *sample = (*sample * gain).tanh();
                }
            }
        } else {
            for channel in buffer.channels_mut() {
                for sample in channel.iter_mut() {
                    *sample *= gain;
                }
            }
        }
    }

    /// Plain gain with clipping disabled
    pub fn apply_gain(&self, buffer: &mut AudioBuffer, gain: f32) {
        self.process(buffer, gain, false);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE_RATE: f32 = 48000.0;

    fn generate_test_signal(samples: usize, frequency: f32) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    // -------------------------------------------------------------------------
    // Decibel Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_gain_to_db() {
        assert!((gain_to_db(1.0, SILENCE_FLOOR_DB) - 0.0).abs() < 1e-6);
        assert!((gain_to_db(0.5, SILENCE_FLOOR_DB) - (-6.0206)).abs() < 1e-3);
        assert!((gain_to_db(0.1, SILENCE_FLOOR_DB) - (-20.0)).abs() < 1e-4);
    }

    #[test]
    fn test_gain_to_db_floor() {
        assert_eq!(gain_to_db(0.0, SILENCE_FLOOR_DB), SILENCE_FLOOR_DB);
        assert_eq!(gain_to_db(-1.0, SILENCE_FLOOR_DB), SILENCE_FLOOR_DB);
        assert_eq!(gain_to_db(f32::NAN, SILENCE_FLOOR_DB), SILENCE_FLOOR_DB);
        // -140 dB is quieter than the floor
        assert_eq!(gain_to_db(1.0e-7, SILENCE_FLOOR_DB), SILENCE_FLOOR_DB);
        assert_eq!(gain_to_db(0.0, -60.0), -60.0);
    }

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(0.0, SILENCE_FLOOR_DB) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-6.0, SILENCE_FLOOR_DB) - 0.501).abs() < 1e-3);
        assert_eq!(db_to_gain(-100.0, SILENCE_FLOOR_DB), 0.0);
        assert_eq!(db_to_gain(-120.0, SILENCE_FLOOR_DB), 0.0);
    }

    // -------------------------------------------------------------------------
    // Signal Processor Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_gain_only() {
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0, -0.5, 0.25], vec![0.8; 3]]);
        SignalProcessor::new().process(&mut buffer, 0.5, false);

        assert_eq!(buffer.channel(0).unwrap(), &[0.5, -0.25, 0.125]);
        assert_eq!(buffer.channel(1).unwrap(), &[0.4; 3]);
    }

    #[test]
    fn test_gain_then_clip() {
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0; 4]]);
        SignalProcessor::new().process(&mut buffer, 2.0, true);

        for &sample in buffer.channel(0).unwrap() {
            assert_eq!(sample, 2.0_f32.tanh());
            assert!((sample - 0.9640).abs() < 1e-4);
        }
    }

    #[test]
    fn test_clipping_applies_after_gain() {
        // tanh(0.5 * 4) differs from 4 * tanh(0.5)
        let sample = SignalProcessor::process_sample(0.5, 4.0, true);
        assert_eq!(sample, 2.0_f32.tanh());
        assert!((sample - 4.0 * 0.5_f32.tanh()).abs() > 0.5);
    }

    #[test]
    fn test_unity_gain_is_identity() {
        let input = generate_test_signal(512, 440.0);
        let mut buffer = AudioBuffer::from_channels(vec![input.clone(), input.clone()]);
        SignalProcessor::new().process(&mut buffer, 1.0, false);

        for channel in buffer.channels() {
            assert_eq!(channel, input.as_slice());
        }
    }

    #[test]
    fn test_apply_gain_matches_unclipped_process() {
        let input = generate_test_signal(64, 1000.0);
        let mut a = AudioBuffer::from_channels(vec![input.clone()]);
        let mut b = AudioBuffer::from_channels(vec![input]);

        let processor = SignalProcessor::new();
        processor.apply_gain(&mut a, 0.3);
        processor.process(&mut b, 0.3, false);

        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_buffer_is_noop() {
        let processor = SignalProcessor::new();

        let mut no_channels = AudioBuffer::new(0, 128);
        processor.process(&mut no_channels, 2.0, true);
        assert_eq!(no_channels.num_channels(), 0);

        let mut no_samples = AudioBuffer::new(2, 0);
        processor.process(&mut no_samples, 2.0, true);
        assert_eq!(no_samples.num_samples(), 0);
    }

    #[test]
    fn test_only_active_samples_processed() {
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0; 8]]);
        buffer.set_num_samples(4);
        SignalProcessor::new().process(&mut buffer, 0.5, false);

        buffer.set_num_samples(8);
        assert_eq!(
            buffer.channel(0).unwrap(),
            &[0.5, 0.5, 0.5, 0.5, 1.0, 1.0, 1.0, 1.0]
        );
    }

    #[test]
    fn test_pathological_gain_passes_through() {
        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0, -1.0, 0.0]]);
        SignalProcessor::new().process(&mut buffer, -2.0, false);
        assert_eq!(buffer.channel(0).unwrap(), &[-2.0, 2.0, -0.0]);

        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0]]);
        SignalProcessor::new().process(&mut buffer, f32::NAN, false);
        assert!(buffer.channel(0).unwrap()[0].is_nan());

        let mut buffer = AudioBuffer::from_channels(vec![vec![1.0, -1.0]]);
        SignalProcessor::new().process(&mut buffer, f32::INFINITY, true);
        assert_eq!(buffer.channel(0).unwrap(), &[1.0, -1.0]);
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    fn channels_strategy() -> impl Strategy<Value = Vec<Vec<f32>>> {
        (1usize..4, 0usize..256).prop_flat_map(|(channels, samples)| {
            prop::collection::vec(prop::collection::vec(-4.0f32..4.0, samples), channels)
        })
    }

    proptest! {
        #[test]
        fn prop_gain_without_clipping_is_multiplication(
            channels in channels_strategy(),
            gain in 0.0f32..8.0,
        ) {
            let mut buffer = AudioBuffer::from_channels(channels.clone());
            SignalProcessor::new().process(&mut buffer, gain, false);

            for (out, input) in buffer.channels().zip(channels.iter()) {
                for (&o, &i) in out.iter().zip(input.iter()) {
                    prop_assert_eq!(o.to_bits(), (i * gain).to_bits());
                }
            }
        }

        #[test]
        fn prop_clipping_is_tanh_of_gained_signal(
            channels in channels_strategy(),
            gain in 0.0f32..8.0,
        ) {
            let mut buffer = AudioBuffer::from_channels(channels.clone());
            SignalProcessor::new().process(&mut buffer, gain, true);

            for (out, input) in buffer.channels().zip(channels.iter()) {
                for (&o, &i) in out.iter().zip(input.iter()) {
                    prop_assert_eq!(o.to_bits(), (i * gain).tanh().to_bits());
                    prop_assert!((-1.0..=1.0).contains(&o));
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Performance Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_performance_one_second_stereo() {
        let signal = generate_test_signal(48000, 440.0);
        let mut buffer = AudioBuffer::from_channels(vec![signal.clone(), signal]);
        let processor = SignalProcessor::new();

        let start = std::time::Instant::now();
        for _ in 0..10 {
            processor.process(&mut buffer, 0.9, true);
        }
        let duration = start.elapsed();

        // 10 seconds of stereo audio well under real time
        assert!(duration.as_millis() < 1000);
    }
}
