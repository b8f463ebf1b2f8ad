//! Host-automatable parameters and the text command bus
//!
//! The processing core never owns parameters. Each block it receives a plain
//! [`ProcessParams`] value; [`ParameterStore`] is the lock-free place a control
//! thread writes to and the audio thread snapshots from, and [`Command`] is the
//! runtime control surface parsed from text lines.

use crate::domain::dsp::{db_to_gain, SILENCE_FLOOR_DB};
use crossbeam::utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use thiserror::Error;
use tracing::debug;

/// Parameter ranges exposed to the host
pub mod ranges {
    /// Linear gain range
    pub const GAIN_MIN: f32 = 0.0;
    pub const GAIN_MAX: f32 = 1.0;
    pub const GAIN_DEFAULT: f32 = 1.0;
}

pub type Result<T> = std::result::Result<T, ParameterError>;

/// Errors produced while parsing or applying a command
#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing value for {0}")]
    MissingValue(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Parameter values for one block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessParams {
    /// Linear gain multiplier
    pub gain: f32,
    /// Soft-clip the gained signal with tanh
    pub clipping_enabled: bool,
    /// Skip processing and reset the meters
    pub bypass: bool,
}

impl ProcessParams {
    pub fn new(gain: f32, clipping_enabled: bool) -> Self {
        Self {
            gain,
            clipping_enabled,
            bypass: false,
        }
    }

    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }
}

impl Default for ProcessParams {
    fn default() -> Self {
        Self::new(ranges::GAIN_DEFAULT, false)
    }
}

impl fmt::Display for ProcessParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gain={:.3} clipping={} bypass={}",
            self.gain,
            on_off(self.clipping_enabled),
            on_off(self.bypass)
        )
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Lock-free parameter storage shared between control and audio threads
///
/// Each parameter is an independent atomic, so a snapshot may mix values from
/// two concurrent writes; every field is meaningful on its own.
#[derive(Debug)]
pub struct ParameterStore {
    gain: CachePadded<AtomicU32>,
    clipping: AtomicBool,
    bypass: AtomicBool,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new(ProcessParams::default())
    }
}

impl ParameterStore {
    pub fn new(initial: ProcessParams) -> Self {
        let gain = if initial.gain.is_nan() {
            ranges::GAIN_DEFAULT
        } else {
            initial.gain.clamp(ranges::GAIN_MIN, ranges::GAIN_MAX)
        };

        Self {
            gain: CachePadded::new(AtomicU32::new(gain.to_bits())),
            clipping: AtomicBool::new(initial.clipping_enabled),
            bypass: AtomicBool::new(initial.bypass),
        }
    }

    /// Read every parameter for the coming block; real-time safe
    #[inline]
    pub fn snapshot(&self) -> ProcessParams {
        ProcessParams {
            gain: self.gain(),
            clipping_enabled: self.clipping_enabled(),
            bypass: self.bypass(),
        }
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub fn clipping_enabled(&self) -> bool {
        self.clipping.load(Ordering::Relaxed)
    }

    pub fn bypass(&self) -> bool {
        self.bypass.load(Ordering::Relaxed)
    }

    /// Set the gain, clamped to the host range; NaN leaves it unchanged
    ///
    /// Returns the gain now in effect.
    pub fn set_gain(&self, gain: f32) -> f32 {
        if gain.is_nan() {
            return self.gain();
        }
        let gain = gain.clamp(ranges::GAIN_MIN, ranges::GAIN_MAX);
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
        debug!(gain, "Gain set");
        gain
    }

    pub fn set_clipping(&self, enabled: bool) {
        self.clipping.store(enabled, Ordering::Relaxed);
        debug!(enabled, "Clipping set");
    }

    pub fn set_bypass(&self, bypass: bool) {
        self.bypass.store(bypass, Ordering::Relaxed);
        debug!(bypass, "Bypass set");
    }

    /// Flip clipping, returning the new state
    pub fn toggle_clipping(&self) -> bool {
        let enabled = !self.clipping.fetch_xor(true, Ordering::Relaxed);
        debug!(enabled, "Clipping toggled");
        enabled
    }

    /// Flip bypass, returning the new state
    pub fn toggle_bypass(&self) -> bool {
        let bypass = !self.bypass.fetch_xor(true, Ordering::Relaxed);
        debug!(bypass, "Bypass toggled");
        bypass
    }

    /// Apply a command and describe what changed
    pub fn execute(&self, command: Command) -> CommandResult {
        match command {
            Command::SetGain(requested) => CommandResult::GainChanged {
                requested,
                applied: self.set_gain(requested),
            },
            Command::SetClipping(enabled) => {
                self.set_clipping(enabled);
                CommandResult::ClippingChanged(enabled)
            }
            Command::ToggleClipping => CommandResult::ClippingChanged(self.toggle_clipping()),
            Command::SetBypass(bypass) => {
                self.set_bypass(bypass);
                CommandResult::BypassChanged(bypass)
            }
            Command::ToggleBypass => CommandResult::BypassChanged(self.toggle_bypass()),
            Command::Status => CommandResult::Status(self.snapshot()),
        }
    }
}

/// Runtime parameter commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetGain(f32),
    SetClipping(bool),
    ToggleClipping,
    SetBypass(bool),
    ToggleBypass,
    Status,
}

/// Result of command execution
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandResult {
    GainChanged { requested: f32, applied: f32 },
    ClippingChanged(bool),
    BypassChanged(bool),
    Status(ProcessParams),
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::GainChanged { requested, applied } if requested != applied => {
                write!(f, "gain {applied:.3} (requested {requested:.3}, clamped)")
            }
            CommandResult::GainChanged { applied, .. } => write!(f, "gain {applied:.3}"),
            CommandResult::ClippingChanged(enabled) => write!(f, "clipping {}", on_off(*enabled)),
            CommandResult::BypassChanged(bypass) => write!(f, "bypass {}", on_off(*bypass)),
            CommandResult::Status(params) => write!(f, "{params}"),
        }
    }
}

/// Parse a switch argument; `None` means toggle
fn parse_switch(name: &'static str, value: Option<&str>) -> Result<Option<bool>> {
    let value = value.ok_or(ParameterError::MissingValue(name))?;
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Ok(Some(true)),
        "off" | "false" | "0" | "no" => Ok(Some(false)),
        "toggle" => Ok(None),
        _ => Err(ParameterError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}

/// Parse a gain argument: linear (`0.5`) or decibels (`-6db`)
fn parse_gain(value: Option<&str>) -> Result<f32> {
    let value = value.ok_or(ParameterError::MissingValue("gain"))?;
    let invalid = || ParameterError::InvalidValue {
        name: "gain",
        value: value.to_string(),
    };

    let lower = value.to_ascii_lowercase();
    let gain = match lower.strip_suffix("db") {
        Some(db) => db_to_gain(db.trim().parse::<f32>().map_err(|_| invalid())?, SILENCE_FLOOR_DB),
        None => lower.parse::<f32>().map_err(|_| invalid())?,
    };

    if gain.is_finite() {
        Ok(gain)
    } else {
        Err(invalid())
    }
}

impl FromStr for Command {
    type Err = ParameterError;

    /// Parse lines such as `gain 0.5`, `gain -6db`, `clip on`, `bypass toggle`, `status`
    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(ParameterError::Empty)?;
        let value = words.next();

        match name.to_ascii_lowercase().as_str() {
            "gain" | "g" => parse_gain(value).map(Command::SetGain),
            "clip" | "clipping" | "c" => Ok(match parse_switch("clipping", value)? {
                Some(enabled) => Command::SetClipping(enabled),
                None => Command::ToggleClipping,
            }),
            "bypass" | "b" => Ok(match parse_switch("bypass", value)? {
                Some(bypass) => Command::SetBypass(bypass),
                None => Command::ToggleBypass,
            }),
            "status" | "s" => Ok(Command::Status),
            other => Err(ParameterError::UnknownCommand(other.to_string())),
        }
    }
}
