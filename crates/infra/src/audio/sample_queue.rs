//! Lock-free sample transport between the input and output callbacks
//!
//! The capture callback pushes interleaved samples, the playback callback pops
//! them. Neither side blocks or allocates. Frames that do not fit are dropped,
//! missing frames are replaced with silence, and both events are counted for
//! the control thread to report.

use crossbeam::queue::ArrayQueue;
use crossbeam::utils::CachePadded;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Transport counters, updated from the audio callbacks
#[derive(Debug, Default)]
pub struct StreamStats {
    /// Samples dropped because the queue was full
    overruns: CachePadded<AtomicU64>,
    /// Samples replaced with silence because the queue was empty
    underruns: CachePadded<AtomicU64>,
    /// Errors reported by the audio backend
    stream_errors: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub overruns: u64,
    pub underruns: u64,
    pub stream_errors: u64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_overrun(&self, samples: usize) {
        self.overruns.fetch_add(samples as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_underrun(&self, samples: usize) {
        self.underruns.fetch_add(samples as u64, Ordering::Relaxed);
    }

    pub fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            overruns: self.overruns.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
        }
    }
}

/// Bounded queue of interleaved frames
///
/// Storage is allocated once in [`with_capacity`](Self::with_capacity). One
/// thread pushes and one thread pops. Samples are dropped and padded in whole
/// frames so the channel order survives overruns and underruns.
pub struct SampleQueue {
    queue: ArrayQueue<f32>,
    channels: usize,
    /// Position of the producer inside the current input frame
    write_phase: AtomicUsize,
    /// Whether the current input frame is being dropped
    dropping: AtomicBool,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples of `channels`
    /// interleaved channels
    ///
    /// The capacity is rounded down to whole frames, and is at least one frame.
    pub fn with_capacity(capacity: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = (capacity / channels).max(1);
        Self {
            queue: ArrayQueue::new(frames * channels),
            channels,
            write_phase: AtomicUsize::new(0),
            dropping: AtomicBool::new(false),
        }
    }

    /// Push every whole frame that fits (producer)
    ///
    /// `samples` continues the stream of the previous call, so a frame may
    /// span two calls. Returns the number of samples dropped.
    pub fn push_slice(&self, samples: &[f32]) -> usize {
        let channels = self.channels;
        let mut phase = self.write_phase.load(Ordering::Relaxed);
        let mut dropping = self.dropping.load(Ordering::Relaxed);

        // Only the consumer touches the queue meanwhile, so this only grows
        let mut free = self.queue.capacity() - self.queue.len();
        if phase > 0 && !dropping {
            free = free.saturating_sub(channels - phase);
        }

        let mut dropped = 0;
        for &sample in samples {
            if phase == 0 {
                dropping = free < channels;
                if !dropping {
                    free -= channels;
                }
            }
            if dropping || self.queue.push(sample).is_err() {
                dropped += 1;
            }
            phase = (phase + 1) % channels;
        }

        self.write_phase.store(phase, Ordering::Relaxed);
        self.dropping.store(dropping, Ordering::Relaxed);
        dropped
    }

    /// Fill `out` with whole frames, padding the rest with silence (consumer)
    ///
    /// Returns the number of samples that had to be padded.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let frames = (out.len() / self.channels).min(self.queue.len() / self.channels);
        let filled = frames * self.channels;

        for slot in &mut out[..filled] {
            *slot = self.queue.pop().unwrap_or(0.0);
        }
        out[filled..].fill(0.0);

        out.len() - filled
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}
