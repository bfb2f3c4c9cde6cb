//! Output device discovery and selection policy
//!
//! The platform audio API is a capability-providing collaborator behind
//! [`AudioPlatform`]. The [`DeviceManager`] applies the selection policy:
//!
//! 1. an explicitly named device, when it exists
//! 2. the preferred vendor's device on the lowest-latency exclusive API
//! 3. the first device offering exclusive access
//! 4. shared mode, flagged as degraded (or a hard error when exclusivity is
//!    required)

use crate::audio::lock::DeviceHandle;
use crate::error::{Error, Result};
use serde::Serialize;
use spx_common::{DeviceMode, Levers};
use std::sync::Arc;
use tracing::{info, warn};

/// Host audio API class of a device endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostApi {
    /// Steinberg ASIO
    Asio,
    /// WASAPI in exclusive mode
    WasapiExclusive,
    /// WASAPI through the shared mixer
    Wasapi,
    CoreAudio,
    Alsa,
    Jack,
    /// In-process test/simulation backend
    Virtual,
    Other,
}

impl HostApi {
    pub fn is_exclusive(&self) -> bool {
        matches!(self, HostApi::Asio | HostApi::WasapiExclusive)
    }

    /// Lower is lower latency; only meaningful among exclusive APIs
    pub fn latency_rank(&self) -> u8 {
        match self {
            HostApi::Asio => 0,
            HostApi::WasapiExclusive => 1,
            HostApi::Jack => 2,
            HostApi::CoreAudio => 3,
            HostApi::Alsa => 4,
            HostApi::Wasapi => 5,
            HostApi::Virtual => 6,
            HostApi::Other => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostApi::Asio => "asio",
            HostApi::WasapiExclusive => "wasapi_exclusive",
            HostApi::Wasapi => "wasapi",
            HostApi::CoreAudio => "coreaudio",
            HostApi::Alsa => "alsa",
            HostApi::Jack => "jack",
            HostApi::Virtual => "virtual",
            HostApi::Other => "other",
        }
    }
}

impl std::fmt::Display for HostApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One output endpoint: a device reachable through one host API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub name: String,
    pub host_api: HostApi,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, host_api: HostApi) -> Self {
        Self {
            name: name.into(),
            host_api,
        }
    }

    pub fn mode(&self) -> DeviceMode {
        if self.host_api.is_exclusive() {
            DeviceMode::Exclusive
        } else {
            DeviceMode::Shared
        }
    }
}

/// An open output stream, valid for one play
pub trait OutputStream {
    fn sample_rate(&self) -> u32;

    /// Play mono samples on every output channel, returning once the device
    /// has rendered the last one
    fn play_blocking(&mut self, samples: &[f32]) -> Result<()>;
}

/// Platform audio capability
pub trait AudioPlatform: Send + Sync {
    fn name(&self) -> &str;

    /// Whether any exclusive low-latency API exists on this platform
    fn supports_exclusive_audio(&self) -> bool;

    fn output_devices(&self) -> Result<Vec<DeviceInfo>>;

    fn open_output(&self, device: &DeviceInfo, sample_rate: u32) -> Result<Box<dyn OutputStream>>;
}

/// Outcome of the selection policy
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub device: DeviceInfo,
    /// Shared-mode playback; changes the latency/jitter profile
    pub degraded: bool,
    pub degraded_reason: Option<String>,
}

impl Selection {
    pub fn mode(&self) -> DeviceMode {
        self.device.mode()
    }
}

pub struct DeviceManager {
    levers: Arc<Levers>,
    platform: Arc<dyn AudioPlatform>,
}

impl DeviceManager {
    pub fn new(levers: Arc<Levers>, platform: Arc<dyn AudioPlatform>) -> Self {
        Self { levers, platform }
    }

    pub fn platform(&self) -> &Arc<dyn AudioPlatform> {
        &self.platform
    }

    pub fn list(&self) -> Result<Vec<DeviceInfo>> {
        self.platform.output_devices()
    }

    /// Apply the selection policy to the devices the platform reports
    pub fn select(&self) -> Result<Selection> {
        let devices = self.platform.output_devices()?;
        if devices.is_empty() {
            return Err(Error::Device {
                device: self.platform.name().to_string(),
                reason: "no output devices found".to_string(),
            });
        }

        let exclusive_allowed =
            self.levers.force_exclusive && self.platform.supports_exclusive_audio();

        if let Some(name) = self.levers.audio_device.as_deref() {
            let named: Vec<&DeviceInfo> = devices.iter().filter(|d| d.name == name).collect();
            if named.is_empty() {
                warn!("Requested device '{}' not found, applying selection policy", name);
            } else {
                if exclusive_allowed {
                    if let Some(device) = lowest_latency_exclusive(named.iter().copied()) {
                        return Ok(self.exclusive(device, "requested device"));
                    }
                }
                let device = named
                    .iter()
                    .find(|d| !d.host_api.is_exclusive())
                    .copied()
                    .unwrap_or(named[0]);
                if device.host_api.is_exclusive() {
                    // Exclusive-only endpoint while exclusivity is disabled
                    return self.degrade(&devices, self.shared_reason());
                }
                return self.degrade_to(device.clone(), self.shared_reason());
            }
        }

        if exclusive_allowed {
            if self.levers.prefer_vendor_exclusive {
                let vendor = self.levers.preferred_vendor.to_lowercase();
                let vendor_devices = devices
                    .iter()
                    .filter(|d| d.name.to_lowercase().contains(&vendor));
                if let Some(device) = lowest_latency_exclusive(vendor_devices) {
                    return Ok(self.exclusive(device, "preferred vendor"));
                }
            }

            if let Some(device) = devices.iter().find(|d| d.host_api.is_exclusive()) {
                return Ok(self.exclusive(device, "first exclusive device"));
            }
        }

        self.degrade(&devices, self.shared_reason())
    }

    /// Select and wrap the result in a lockable handle
    pub fn handle(&self) -> Result<DeviceHandle> {
        let selection = self.select()?;
        Ok(DeviceHandle::new(
            selection,
            Arc::clone(&self.platform),
            self.levers.sample_rate,
        ))
    }

    fn exclusive(&self, device: &DeviceInfo, rule: &str) -> Selection {
        info!(
            "Selected {} on {} in exclusive mode ({})",
            device.name, device.host_api, rule
        );
        Selection {
            device: device.clone(),
            degraded: false,
            degraded_reason: None,
        }
    }

    fn shared_reason(&self) -> String {
        if !self.levers.force_exclusive {
            "exclusive mode not requested".to_string()
        } else if !self.platform.supports_exclusive_audio() {
            format!("platform '{}' does not support exclusive audio", self.platform.name())
        } else {
            "no exclusive-capable device present".to_string()
        }
    }

    fn degrade(&self, devices: &[DeviceInfo], reason: String) -> Result<Selection> {
        let device = devices
            .iter()
            .filter(|d| !d.host_api.is_exclusive())
            .min_by_key(|d| d.host_api.latency_rank())
            .cloned()
            .ok_or_else(|| Error::Device {
                device: self.platform.name().to_string(),
                reason: format!("{}; no shared-mode device available", reason),
            })?;
        self.degrade_to(device, reason)
    }

    fn degrade_to(&self, device: DeviceInfo, reason: String) -> Result<Selection> {
        if self.levers.exclusive_required {
            return Err(Error::Device {
                device: device.name,
                reason: format!("exclusive access required: {}", reason),
            });
        }
        warn!(
            "Audio running in SHARED mode on {} ({}): {}. Latency and jitter differ from exclusive mode; session is flagged degraded",
            device.name, device.host_api, reason
        );
        Ok(Selection {
            device,
            degraded: true,
            degraded_reason: Some(reason),
        })
    }
}

fn lowest_latency_exclusive<'a>(
    devices: impl Iterator<Item = &'a DeviceInfo>,
) -> Option<&'a DeviceInfo> {
    devices
        .filter(|d| d.host_api.is_exclusive())
        .min_by_key(|d| d.host_api.latency_rank())
}
