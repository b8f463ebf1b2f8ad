//! Peak level metering for display
//!
//! A [`PeakLevelMeter`] follows the absolute sample peak of every channel with
//! an instantaneous attack and an exponential, per-sample release. The release
//! coefficient is chosen so the indicated level falls by 20 dB over the release
//! time, the IEC 60268-18 Type I PPM convention (1.7 s by default).
//!
//! Each channel's peak lives in its own atomic scalar. The audio thread writes
//! with relaxed ordering and a UI thread may read at any time without locking;
//! a reader can see a value one block stale, which is fine for a meter.

use crate::domain::audio::{AudioError, ProcessSpec, Result};
use crate::domain::buffer::AudioBuffer;
use crate::domain::dsp::{gain_to_db, SILENCE_FLOOR_DB};
use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tracing::debug;

/// Type I PPM release time: 20 dB fall in 1.7 s
pub const DEFAULT_RELEASE_TIME_MS: f32 = 1700.0;

/// Linear ratio reached after one release time (-20 dB)
pub const RELEASE_TARGET_RATIO: f64 = 0.1;

/// Channel capacity of a meter built with [`PeakLevelMeter::new`]
pub const DEFAULT_MAX_CHANNELS: usize = 32;

/// Peaks below this are flushed to zero so the release never goes denormal
const DENORMAL_FLOOR: f32 = 1.0e-20;

/// `f32` stored as its bit pattern in an `AtomicU32`
#[derive(Debug, Default)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Ballistics and display floor of a meter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterSettings {
    /// Time for the indicated level to fall by 20 dB
    pub release_time_ms: f32,
    /// Level reported for silence and invalid channels
    pub floor_db: f32,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            release_time_ms: DEFAULT_RELEASE_TIME_MS,
            floor_db: SILENCE_FLOOR_DB,
        }
    }
}

/// Compute the per-sample release multiplier
///
/// `ratio^(1 / samples)` where `samples` is the release time at this sample
/// rate, so that `coeff^samples == ratio`.
pub fn release_coefficient(sample_rate: f64, release_time_ms: f32) -> f32 {
    let time_in_samples = sample_rate * (f64::from(release_time_ms) / 1000.0);
    RELEASE_TARGET_RATIO.powf(1.0 / time_in_samples) as f32
}

/// Per-channel decaying peak follower, shareable between threads
///
/// Storage for `capacity` channels is allocated on construction, so
/// [`prepare`](Self::prepare) only resets values and the meter can be handed
/// to a UI thread behind an `Arc` once and kept across re-prepares.
#[derive(Debug)]
pub struct PeakLevelMeter {
    peaks: Box<[CachePadded<AtomicF32>]>,
    num_channels: AtomicUsize,
    release_coeff: AtomicF32,
    floor_db: f32,
}

impl Default for PeakLevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl PeakLevelMeter {
    /// Create an unprepared meter with room for [`DEFAULT_MAX_CHANNELS`]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CHANNELS)
    }

    /// Create an unprepared meter with room for `max_channels`
    pub fn with_capacity(max_channels: usize) -> Self {
        let peaks = (0..max_channels)
            .map(|_| CachePadded::new(AtomicF32::new(0.0)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            peaks,
            num_channels: AtomicUsize::new(0),
            release_coeff: AtomicF32::new(1.0),
            floor_db: SILENCE_FLOOR_DB,
        }
    }

    /// Report `floor_db` instead of -100 dB for silence
    pub fn with_floor_db(mut self, floor_db: f32) -> Self {
        self.floor_db = floor_db;
        self
    }

    /// Reset every peak and derive the release coefficient for `spec`
    ///
    /// Setup path only; must not run concurrently with [`process`](Self::process).
    pub fn prepare(&self, spec: &ProcessSpec, release_time_ms: f32) -> Result<()> {
        if !spec.sample_rate.is_finite() || spec.sample_rate <= 0.0 {
            return Err(AudioError::InvalidConfiguration(format!(
                "meter sample rate must be positive, got {}",
                spec.sample_rate
            )));
        }
        if !release_time_ms.is_finite() || release_time_ms <= 0.0 {
            return Err(AudioError::InvalidConfiguration(format!(
                "meter release time must be positive, got {release_time_ms} ms"
            )));
        }
        if spec.num_channels > self.peaks.len() {
            return Err(AudioError::UnsupportedConfiguration(format!(
                "meter holds at most {} channels, {} requested",
                self.peaks.len(),
                spec.num_channels
            )));
        }

        let coeff = release_coefficient(spec.sample_rate, release_time_ms);
        self.release_coeff.store(coeff);
        self.num_channels.store(spec.num_channels, Ordering::Relaxed);
        self.reset();

        debug!(
            channels = spec.num_channels,
            sample_rate = spec.sample_rate,
            release_time_ms,
            release_coeff = coeff,
            "Peak meter prepared"
        );
        Ok(())
    }

    /// Follow the peaks of one block; the buffer is only read
    ///
    /// The buffer should carry the prepared channel count. In release builds a
    /// mismatch processes the channels both sides have and ignores the rest.
    pub fn process(&self, buffer: &AudioBuffer) {
        let num_channels = self.num_channels();
        debug_assert_eq!(
            buffer.num_channels(),
            num_channels,
            "buffer channel count differs from the prepared count"
        );

        let coeff = self.release_coeff.load();

        for (peak, samples) in self.peaks[..num_channels].iter().zip(buffer.channels()) {
            let mut running = peak.load();
            for &sample in samples {
                let magnitude = sample.abs();
                if magnitude > running {
                    running = magnitude;
                } else {
                    running *= coeff;
                }
            }
            if running < DENORMAL_FLOOR {
                running = 0.0;
            }
            peak.store(running);
        }
    }

    /// Clear every peak without reallocating; real-time safe
    pub fn reset(&self) {
        for peak in self.peaks.iter() {
            peak.store(0.0);
        }
    }

    /// Current level of one channel in dB, or the floor for an invalid channel
    pub fn level_db(&self, channel: usize) -> f32 {
        match self.peak(channel) {
            Some(peak) => gain_to_db(peak, self.floor_db),
            None => self.floor_db,
        }
    }

    /// Level of the loudest channel in dB
    ///
    /// Takes the maximum rather than an average, so one hot channel of a stereo
    /// pair is never hidden.
    pub fn mono_peak_db(&self) -> f32 {
        let num_channels = self.num_channels();
        if num_channels == 0 {
            return self.floor_db;
        }

        let max_peak = self.peaks[..num_channels]
            .iter()
            .map(|peak| peak.load())
            .fold(0.0_f32, f32::max);

        gain_to_db(max_peak, self.floor_db)
    }

    /// Current linear peak of one channel
    pub fn peak(&self, channel: usize) -> Option<f32> {
        if channel < self.num_channels() {
            Some(self.peaks[channel].load())
        } else {
            None
        }
    }

    /// Prepared channel count (zero until prepared)
    pub fn num_channels(&self) -> usize {
        // Never trust the stored count beyond the allocated storage
        self.num_channels.load(Ordering::Relaxed).min(self.peaks.len())
    }

    pub fn capacity(&self) -> usize {
        self.peaks.len()
    }

    pub fn release_coeff(&self) -> f32 {
        self.release_coeff.load()
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }
}
