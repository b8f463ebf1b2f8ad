//! Domain entities and business rules

pub mod audio;
pub mod buffer;
pub mod config;
pub mod dsp;
pub mod meter;
pub mod params;
pub mod stage;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioEnumerator, AudioError, DeviceId, DeviceInfo, DeviceType, ProcessSpec};
pub use buffer::AudioBuffer;
pub use config::{
    AudioConfig, ConfigError, ConfigManager, GainstageConfig, MeterConfig, ParameterConfig,
};
pub use dsp::{db_to_gain, gain_to_db, SignalProcessor, SILENCE_FLOOR_DB};
pub use meter::{MeterSettings, PeakLevelMeter, DEFAULT_RELEASE_TIME_MS};
pub use params::{Command, CommandResult, ParameterError, ParameterStore, ProcessParams};
pub use stage::{BlockOutcome, GainStage, MeterSnapshot, StageSettings};
