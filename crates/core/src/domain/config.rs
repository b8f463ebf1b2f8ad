//! Configuration management for Gainstage
//!
//! This module provides:
//! - Configuration structs for the audio stream, the meters and the initial
//!   parameter values, stored as TOML
//! - Conversions into the types the processing core is prepared with
//! - A manager for the main configuration file with corrupt-file recovery

use crate::domain::audio::ProcessSpec;
use crate::domain::dsp::SILENCE_FLOOR_DB;
use crate::domain::meter::{MeterSettings, DEFAULT_MAX_CHANNELS, DEFAULT_RELEASE_TIME_MS};
use crate::domain::params::{ranges, ProcessParams};
use crate::domain::stage::StageSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Audio stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Largest block handed to the gain stage, in frames
    pub block_size: u32,

    /// Channels processed by the gain stage
    pub channels: u16,

    /// Input device name (empty = system default)
    pub input_device: String,

    /// Output device name (empty = system default)
    pub output_device: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
            channels: 2,
            input_device: String::new(),
            output_device: String::new(),
        }
    }
}

impl AudioConfig {
    /// Device name to open, `None` for the system default
    pub fn input_device_name(&self) -> Option<&str> {
        non_empty(&self.input_device)
    }

    pub fn output_device_name(&self) -> Option<&str> {
        non_empty(&self.output_device)
    }
}

fn non_empty(name: &str) -> Option<&str> {
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

impl From<&AudioConfig> for ProcessSpec {
    fn from(config: &AudioConfig) -> Self {
        ProcessSpec::new(
            f64::from(config.sample_rate),
            config.block_size as usize,
            usize::from(config.channels),
        )
    }
}

/// Meter ballistics and display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Time for the indicated level to fall by 20 dB
    pub release_time_ms: f32,

    /// Level shown for silence
    pub floor_db: f32,

    /// Meter the signal before the gain stage
    pub input_enabled: bool,

    /// Meter the signal after the gain stage
    pub output_enabled: bool,

    /// How often the CLI prints levels
    pub poll_interval_ms: u64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            release_time_ms: DEFAULT_RELEASE_TIME_MS,
            floor_db: SILENCE_FLOOR_DB,
            input_enabled: true,
            output_enabled: true,
            poll_interval_ms: 50,
        }
    }
}

impl From<&MeterConfig> for MeterSettings {
    fn from(config: &MeterConfig) -> Self {
        MeterSettings {
            release_time_ms: config.release_time_ms,
            floor_db: config.floor_db,
        }
    }
}

/// Parameter values at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterConfig {
    /// Linear gain, 0.0 to 1.0
    pub gain: f32,
    pub clipping: bool,
    pub bypass: bool,
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            gain: ranges::GAIN_DEFAULT,
            clipping: false,
            bypass: false,
        }
    }
}

impl From<&ParameterConfig> for ProcessParams {
    fn from(config: &ParameterConfig) -> Self {
        ProcessParams::new(config.gain, config.clipping).with_bypass(config.bypass)
    }
}

/// Complete Gainstage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GainstageConfig {
    pub audio: AudioConfig,
    pub meter: MeterConfig,
    pub parameters: ParameterConfig,
}

impl GainstageConfig {
    /// Load and validate configuration from a TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(?config, "Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to a TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = self.to_toml()?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Factory default: 48 kHz stereo, 512-frame blocks, unity gain
    pub fn factory_default() -> Self {
        Self::default()
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the processing core cannot be prepared with
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("audio.sample_rate must be positive".into()));
        }
        if audio.block_size == 0 {
            return Err(ConfigError::Invalid("audio.block_size must be positive".into()));
        }
        if audio.channels == 0 {
            return Err(ConfigError::Invalid("audio.channels must be positive".into()));
        }
        if usize::from(audio.channels) > DEFAULT_MAX_CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "audio.channels must be at most {DEFAULT_MAX_CHANNELS}, got {}",
                audio.channels
            )));
        }

        let meter = &self.meter;
        if !meter.release_time_ms.is_finite() || meter.release_time_ms <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "meter.release_time_ms must be positive, got {}",
                meter.release_time_ms
            )));
        }
        if !meter.floor_db.is_finite() || meter.floor_db > 0.0 {
            return Err(ConfigError::Invalid(format!(
                "meter.floor_db must be at or below 0 dB, got {}",
                meter.floor_db
            )));
        }
        if meter.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("meter.poll_interval_ms must be positive".into()));
        }

        let gain = self.parameters.gain;
        if !(ranges::GAIN_MIN..=ranges::GAIN_MAX).contains(&gain) {
            return Err(ConfigError::Invalid(format!(
                "parameters.gain must be within {}..={}, got {gain}",
                ranges::GAIN_MIN,
                ranges::GAIN_MAX
            )));
        }

        Ok(())
    }

    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec::from(&self.audio)
    }

    pub fn stage_settings(&self) -> StageSettings {
        StageSettings {
            meter: MeterSettings::from(&self.meter),
            input_meter_enabled: self.meter.input_enabled,
            output_meter_enabled: self.meter.output_enabled,
            max_channels: DEFAULT_MAX_CHANNELS,
        }
    }

    pub fn initial_params(&self) -> ProcessParams {
        ProcessParams::from(&self.parameters)
    }
}

/// Configuration manager for the main Gainstage config
///
/// Manages the configuration file at `~/.config/gainstage/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a manager for `config_dir/config.toml`
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/gainstage` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("gainstage"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Manager for the default config directory
    pub fn with_default_dir() -> Result<Self> {
        Ok(Self::new(Self::default_config_dir()?))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// A missing file is created with the factory default. A corrupt or
    /// invalid file is copied aside to `config.toml.corrupt` and the factory
    /// default is returned.
    #[instrument(skip(self))]
    pub async fn load(&self) -> GainstageConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = GainstageConfig::factory_default();
            if let Err(e) = self.save(&config).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match GainstageConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                GainstageConfig::factory_default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &GainstageConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Delete the config file if present
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(
                path = %self.config_path.display(),
                "Configuration cleared"
            );
        }

        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
