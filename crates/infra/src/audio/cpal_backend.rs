//! CPAL-based audio device implementation
//!
//! Provides device enumeration and lookup through the CPAL default host.

use cpal::traits::{DeviceTrait, HostTrait};
use gainstage_core::domain::audio::{
    AudioEnumerator, AudioError, DeviceId, DeviceInfo, DeviceType, Result,
};
use tracing::{debug, info, warn};

/// Display name of a CPAL device
#[allow(deprecated)]
pub(crate) fn device_name(device: &cpal::Device) -> String {
    device
        .name()
        .unwrap_or_else(|_| "Unknown Device".to_string())
}

/// Describe a CPAL device in domain terms
fn describe(device: &cpal::Device, device_type: DeviceType) -> DeviceInfo {
    let name = device_name(device);

    let mut channel_counts: Vec<u16> = Vec::new();
    if let Ok(configs) = device.supported_input_configs() {
        channel_counts.extend(configs.map(|config| config.channels()));
    }
    if let Ok(configs) = device.supported_output_configs() {
        channel_counts.extend(configs.map(|config| config.channels()));
    }
    channel_counts.sort_unstable();
    channel_counts.dedup();

    let default_config = match device_type {
        DeviceType::Output => device.default_output_config(),
        DeviceType::Input | DeviceType::Duplex => device
            .default_input_config()
            .or_else(|_| device.default_output_config()),
    };
    let default_sample_rate = default_config.ok().map(|config| config.sample_rate());

    debug!(name = %name, ?device_type, ?channel_counts, "Described device");

    DeviceInfo {
        id: DeviceId::new(name.clone()),
        name,
        device_type,
        channel_counts,
        default_sample_rate,
    }
}

/// CPAL-based audio enumerator
pub struct CpalEnumerator {
    host: cpal::Host,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        info!("Initializing CPAL enumerator");
        Self::new()
    }
}

impl CpalEnumerator {
    pub fn new() -> Self {
        let host = cpal::default_host();
        debug!("Using audio host: {:?}", host.id());
        Self { host }
    }

    pub fn host(&self) -> &cpal::Host {
        &self.host
    }

    fn determine_device_type(device: &cpal::Device) -> Option<DeviceType> {
        let has_input = device
            .supported_input_configs()
            .map(|mut configs| configs.next().is_some())
            .unwrap_or(false);
        let has_output = device
            .supported_output_configs()
            .map(|mut configs| configs.next().is_some())
            .unwrap_or(false);

        match (has_input, has_output) {
            (true, true) => Some(DeviceType::Duplex),
            (true, false) => Some(DeviceType::Input),
            (false, true) => Some(DeviceType::Output),
            (false, false) => None,
        }
    }

    /// Capture device by name, or the default when `name` is `None`
    pub fn find_input_device(&self, name: Option<&str>) -> Result<cpal::Device> {
        match name {
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string())),
            Some(name) => self
                .host
                .input_devices()
                .map_err(|e| AudioError::OsError(e.to_string()))?
                .find(|device| device_name(device) == name)
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        }
    }

    /// Playback device by name, or the default when `name` is `None`
    pub fn find_output_device(&self, name: Option<&str>) -> Result<cpal::Device> {
        match name {
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string())),
            Some(name) => self
                .host
                .output_devices()
                .map_err(|e| AudioError::OsError(e.to_string()))?
                .find(|device| device_name(device) == name)
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
        }
    }
}

impl AudioEnumerator for CpalEnumerator {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        info!("Enumerating all audio devices");

        let cpal_devices = self
            .host
            .devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let mut devices = Vec::new();
        for device in cpal_devices {
            match Self::determine_device_type(&device) {
                Some(device_type) => devices.push(describe(&device, device_type)),
                None => warn!(name = %device_name(&device), "Skipping device with no inputs or outputs"),
            }
        }

        info!("Found {} audio devices", devices.len());
        Ok(devices)
    }

    fn input_devices(&self) -> Result<Vec<DeviceInfo>> {
        let all_devices = self.devices()?;
        Ok(all_devices
            .into_iter()
            .filter(|d| matches!(d.device_type, DeviceType::Input | DeviceType::Duplex))
            .collect())
    }

    fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        let all_devices = self.devices()?;
        Ok(all_devices
            .into_iter()
            .filter(|d| matches!(d.device_type, DeviceType::Output | DeviceType::Duplex))
            .collect())
    }

    fn default_input_device(&self) -> Result<DeviceInfo> {
        let device = self.find_input_device(None)?;
        Ok(describe(&device, DeviceType::Input))
    }

    fn default_output_device(&self) -> Result<DeviceInfo> {
        let device = self.find_output_device(None)?;
        Ok(describe(&device, DeviceType::Output))
    }
}
