//! Planar multichannel sample buffer
//!
//! Storage is allocated once for `num_channels * capacity` samples. The active
//! block length can shrink and grow within that capacity, so a host callback
//! that delivers variable-sized blocks never reallocates.

/// Planar `f32` audio buffer with a fixed per-channel capacity
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioBuffer {
    data: Vec<f32>,
    num_channels: usize,
    capacity: usize,
    num_samples: usize,
}

impl AudioBuffer {
    /// Create a silent buffer whose active length equals its capacity
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            data: vec![0.0; num_channels * capacity],
            num_channels,
            capacity,
            num_samples: capacity,
        }
    }

    /// Build a buffer from per-channel sample vectors
    ///
    /// Channels shorter than the longest one are padded with silence.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        let capacity = channels.iter().map(Vec::len).max().unwrap_or(0);
        let mut buffer = Self::new(channels.len(), capacity);
        for (ch, samples) in channels.iter().enumerate() {
            let start = ch * capacity;
            buffer.data[start..start + samples.len()].copy_from_slice(samples);
        }
        buffer
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    /// Active block length
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Largest block length this buffer can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True when there is nothing to process
    pub fn is_empty(&self) -> bool {
        self.num_channels == 0 || self.num_samples == 0
    }

    /// Change the active block length without reallocating
    ///
    /// The length is clamped to the capacity; the applied length is returned.
    pub fn set_num_samples(&mut self, num_samples: usize) -> usize {
        self.num_samples = num_samples.min(self.capacity);
        self.num_samples
    }

    /// Active samples of one channel
    pub fn channel(&self, channel: usize) -> Option<&[f32]> {
        if channel >= self.num_channels {
            return None;
        }
        let start = channel * self.capacity;
        Some(&self.data[start..start + self.num_samples])
    }

    /// Mutable active samples of one channel
    pub fn channel_mut(&mut self, channel: usize) -> Option<&mut [f32]> {
        if channel >= self.num_channels {
            return None;
        }
        let start = channel * self.capacity;
        Some(&mut self.data[start..start + self.num_samples])
    }

    /// Iterate over the active samples of every channel
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> + '_ {
        let len = self.num_samples;
        // chunks() rejects a zero size; an empty buffer yields no chunks anyway
        self.data
            .chunks(self.capacity.max(1))
            .take(self.num_channels)
            .map(move |chunk| &chunk[..len])
    }

    /// Iterate mutably over the active samples of every channel
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> + '_ {
        let len = self.num_samples;
        let num_channels = self.num_channels;
        self.data
            .chunks_mut(self.capacity.max(1))
            .take(num_channels)
            .map(move |chunk| &mut chunk[..len])
    }

    /// Deinterleave host samples into this buffer
    ///
    /// Reads as many whole frames as fit into the capacity and sets the active
    /// length accordingly. Channels missing from the source are silenced,
    /// extra source channels are ignored. Returns the number of frames read.
    pub fn copy_from_interleaved(&mut self, interleaved: &[f32], source_channels: usize) -> usize {
        if source_channels == 0 {
            self.num_samples = 0;
            return 0;
        }

        let frames = (interleaved.len() / source_channels).min(self.capacity);
        self.num_samples = frames;

        for ch in 0..self.num_channels {
            let start = ch * self.capacity;
            let dest = &mut self.data[start..start + frames];
            if ch < source_channels {
                for (frame, sample) in dest.iter_mut().enumerate() {
                    *sample = interleaved[frame * source_channels + ch];
                }
            } else {
                dest.fill(0.0);
            }
        }

        frames
    }

    /// Interleave the active block into host memory
    ///
    /// Writes as many whole frames as both sides hold. Destination channels
    /// beyond this buffer's channel count are silenced. Returns the number of
    /// frames written.
    pub fn copy_to_interleaved(&self, interleaved: &mut [f32], dest_channels: usize) -> usize {
        if dest_channels == 0 {
            return 0;
        }

        let frames = (interleaved.len() / dest_channels).min(self.num_samples);

        for frame in 0..frames {
            let out = &mut interleaved[frame * dest_channels..(frame + 1) * dest_channels];
            for (ch, sample) in out.iter_mut().enumerate() {
                *sample = if ch < self.num_channels {
                    self.data[ch * self.capacity + frame]
                } else {
                    0.0
                };
            }
        }

        frames
    }
}
