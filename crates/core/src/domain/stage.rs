//! The gain stage: metering around the signal processor
//!
//! One [`GainStage`] is what runs inside the audio callback. Per block it
//! observes the input, applies gain and optional soft clipping in place, then
//! observes the output:
//!
//! ```text
//! buffer -> input meter -> SignalProcessor -> output meter -> buffer
//! ```
//!
//! The meters are shared behind `Arc` so a UI thread can poll them while the
//! audio thread owns the stage.

use crate::domain::audio::{ProcessSpec, Result};
use crate::domain::buffer::AudioBuffer;
use crate::domain::dsp::SignalProcessor;
use crate::domain::meter::{MeterSettings, PeakLevelMeter, DEFAULT_MAX_CHANNELS};
use crate::domain::params::ProcessParams;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Static composition of a gain stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    pub meter: MeterSettings,
    /// Meter the signal before gain is applied
    pub input_meter_enabled: bool,
    /// Meter the signal after gain and clipping
    pub output_meter_enabled: bool,
    /// Channel capacity of both meters
    pub max_channels: usize,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            meter: MeterSettings::default(),
            input_meter_enabled: true,
            output_meter_enabled: true,
            max_channels: DEFAULT_MAX_CHANNELS,
        }
    }
}

/// What happened to a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Metered and processed
    Processed,
    /// Left untouched, meters reset
    Bypassed,
    /// Left untouched because the stage is unprepared or the block is empty
    Skipped,
}

/// Input and output levels in dB at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeterSnapshot {
    pub input_db: f32,
    pub output_db: f32,
}

/// Signal processor with optional input and output peak meters
#[derive(Debug)]
pub struct GainStage {
    settings: StageSettings,
    processor: SignalProcessor,
    input_meter: Arc<PeakLevelMeter>,
    output_meter: Arc<PeakLevelMeter>,
    spec: Option<ProcessSpec>,
}

impl Default for GainStage {
    fn default() -> Self {
        Self::new(StageSettings::default())
    }
}

impl GainStage {
    pub fn new(settings: StageSettings) -> Self {
        let meter = || {
            Arc::new(
                PeakLevelMeter::with_capacity(settings.max_channels)
                    .with_floor_db(settings.meter.floor_db),
            )
        };

        Self {
            settings,
            processor: SignalProcessor::new(),
            input_meter: meter(),
            output_meter: meter(),
            spec: None,
        }
    }

    /// Configure for a stream; not real-time safe
    ///
    /// On error the previous preparation, if any, is kept.
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<()> {
        spec.validate()?;

        let release_time_ms = self.settings.meter.release_time_ms;
        self.input_meter.prepare(&spec, release_time_ms)?;
        self.output_meter.prepare(&spec, release_time_ms)?;
        self.spec = Some(spec);

        info!(
            sample_rate = spec.sample_rate,
            block_size = spec.maximum_block_size,
            channels = spec.num_channels,
            input_meter = self.settings.input_meter_enabled,
            output_meter = self.settings.output_meter_enabled,
            "Gain stage prepared"
        );
        Ok(())
    }

    /// Run one block in place; real-time safe
    pub fn process_block(
        &mut self,
        buffer: &mut AudioBuffer,
        params: ProcessParams,
    ) -> BlockOutcome {
        if self.spec.is_none() {
            return BlockOutcome::Skipped;
        }

        if params.bypass {
            // Reset so the display falls to silence instead of freezing
            self.input_meter.reset();
            self.output_meter.reset();
            return BlockOutcome::Bypassed;
        }

        if buffer.is_empty() {
            return BlockOutcome::Skipped;
        }

        if self.settings.input_meter_enabled {
            self.input_meter.process(buffer);
        }

        self.processor
            .process(buffer, params.gain, params.clipping_enabled);

        if self.settings.output_meter_enabled {
            self.output_meter.process(buffer);
        }

        BlockOutcome::Processed
    }

    pub fn input_meter(&self) -> Arc<PeakLevelMeter> {
        Arc::clone(&self.input_meter)
    }

    pub fn output_meter(&self) -> Arc<PeakLevelMeter> {
        Arc::clone(&self.output_meter)
    }

    /// Loudest-channel input and output levels
    pub fn levels(&self) -> MeterSnapshot {
        MeterSnapshot {
            input_db: self.input_meter.mono_peak_db(),
            output_db: self.output_meter.mono_peak_db(),
        }
    }

    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    pub fn is_prepared(&self) -> bool {
        self.spec.is_some()
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }
}
