//! Live duplex audio through a gain stage
//!
//! Captured samples travel from the CPAL input callback to the output callback
//! through a [`SampleQueue`]. The output callback runs the [`GainStage`] on
//! them in blocks no larger than the prepared block size and writes the result
//! to the device.

use crate::audio::cpal_backend::{device_name, CpalEnumerator};
use crate::audio::sample_queue::{SampleQueue, StatsSnapshot, StreamStats};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::Stream;
use gainstage_core::domain::audio::{AudioError, ProcessSpec, Result};
use gainstage_core::domain::buffer::AudioBuffer;
use gainstage_core::domain::config::AudioConfig;
use gainstage_core::domain::meter::PeakLevelMeter;
use gainstage_core::domain::params::ParameterStore;
use gainstage_core::domain::stage::{GainStage, MeterSnapshot};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Blocks of capture latency the queue can absorb
const QUEUE_BLOCKS: usize = 4;

/// Runs a gain stage over interleaved device buffers
///
/// Every buffer is allocated in [`new`](Self::new); [`process`](Self::process)
/// is safe to call from an audio callback.
pub struct BlockRunner {
    stage: GainStage,
    store: Arc<ParameterStore>,
    queue: Arc<SampleQueue>,
    stats: Arc<StreamStats>,
    buffer: AudioBuffer,
    scratch: Vec<f32>,
    input_channels: usize,
    block_size: usize,
}

impl BlockRunner {
    /// Wrap a prepared stage
    pub fn new(
        stage: GainStage,
        store: Arc<ParameterStore>,
        queue: Arc<SampleQueue>,
        stats: Arc<StreamStats>,
        input_channels: usize,
    ) -> Result<Self> {
        let spec = stage.spec().ok_or_else(|| {
            AudioError::InvalidConfiguration("gain stage must be prepared before streaming".into())
        })?;
        if input_channels == 0 {
            return Err(AudioError::InvalidConfiguration(
                "input channel count must be at least one".into(),
            ));
        }
        if queue.channels() != input_channels {
            return Err(AudioError::InvalidConfiguration(format!(
                "sample queue carries {} channels, input has {}",
                queue.channels(),
                input_channels
            )));
        }

        Ok(Self {
            stage,
            store,
            queue,
            stats,
            buffer: AudioBuffer::new(spec.num_channels, spec.maximum_block_size),
            scratch: vec![0.0; spec.maximum_block_size * input_channels],
            input_channels,
            block_size: spec.maximum_block_size,
        })
    }

    /// Fill an interleaved output buffer with processed input
    pub fn process(&mut self, output: &mut [f32], output_channels: usize) {
        if output_channels == 0 {
            return;
        }

        let params = self.store.snapshot();

        for chunk in output.chunks_mut(self.block_size * output_channels) {
            let frames = chunk.len() / output_channels;
            let input = &mut self.scratch[..frames * self.input_channels];

            let padded = self.queue.pop_into(input);
            if padded > 0 {
                self.stats.record_underrun(padded);
            }

            self.buffer.copy_from_interleaved(input, self.input_channels);
            self.stage.process_block(&mut self.buffer, params);
            let written = self.buffer.copy_to_interleaved(chunk, output_channels);

            // Trailing partial frame
            chunk[written * output_channels..].fill(0.0);
        }
    }

    pub fn stage(&self) -> &GainStage {
        &self.stage
    }
}

/// Running input and output streams joined by a gain stage
///
/// Dropping the value stops both streams.
pub struct DuplexStream {
    _input: Stream,
    _output: Stream,
    spec: ProcessSpec,
    input_meter: Arc<PeakLevelMeter>,
    output_meter: Arc<PeakLevelMeter>,
    stats: Arc<StreamStats>,
    input_device: String,
    output_device: String,
}

impl DuplexStream {
    /// Prepare `stage` for `config` and start streaming through it
    pub fn start(
        config: &AudioConfig,
        mut stage: GainStage,
        store: Arc<ParameterStore>,
    ) -> Result<Self> {
        let spec = ProcessSpec::from(config);
        stage.prepare(spec)?;

        let enumerator = CpalEnumerator::new();
        let input_device = enumerator.find_input_device(config.input_device_name())?;
        let output_device = enumerator.find_output_device(config.output_device_name())?;
        let input_name = device_name(&input_device);
        let output_name = device_name(&output_device);

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.block_size),
        };
        let input_channels = usize::from(config.channels);
        let output_channels = usize::from(config.channels);

        info!(
            input = %input_name,
            output = %output_name,
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            channels = config.channels,
            "Starting duplex stream"
        );

        let queue = Arc::new(SampleQueue::with_capacity(
            spec.maximum_block_size * input_channels * QUEUE_BLOCKS,
            input_channels,
        ));
        let stats = Arc::new(StreamStats::new());
        let input_meter = stage.input_meter();
        let output_meter = stage.output_meter();

        let input_stream = {
            let queue = Arc::clone(&queue);
            let stats = Arc::clone(&stats);
            let error_stats = Arc::clone(&stats);
            input_device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let dropped = queue.push_slice(data);
                        if dropped > 0 {
                            stats.record_overrun(dropped);
                        }
                    },
                    move |err| {
                        error_stats.record_stream_error();
                        error!("Input stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| AudioError::StreamError(format!("Failed to build input stream: {}", e)))?
        };

        let mut runner = BlockRunner::new(
            stage,
            store,
            Arc::clone(&queue),
            Arc::clone(&stats),
            input_channels,
        )?;
        let error_stats = Arc::clone(&stats);
        let output_stream = output_device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    runner.process(data, output_channels);
                },
                move |err| {
                    error_stats.record_stream_error();
                    error!("Output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))?;

        input_stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start input stream: {}", e)))?;
        output_stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start output stream: {}", e)))?;

        Ok(Self {
            _input: input_stream,
            _output: output_stream,
            spec,
            input_meter,
            output_meter,
            stats,
            input_device: input_name,
            output_device: output_name,
        })
    }

    /// Current loudest-channel levels
    pub fn levels(&self) -> MeterSnapshot {
        MeterSnapshot {
            input_db: self.input_meter.mono_peak_db(),
            output_db: self.output_meter.mono_peak_db(),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn spec(&self) -> ProcessSpec {
        self.spec
    }

    pub fn input_device(&self) -> &str {
        &self.input_device
    }

    pub fn output_device(&self) -> &str {
        &self.output_device
    }

    /// Stop both streams
    pub fn stop(self) {
        let stats = self.stats.snapshot();
        if stats.overruns > 0 || stats.underruns > 0 {
            warn!(
                overruns = stats.overruns,
                underruns = stats.underruns,
                "Transport glitches during session"
            );
        }
        info!("Duplex stream stopped");
    }
}
