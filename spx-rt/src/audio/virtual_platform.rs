//! In-process audio platform
//!
//! Used by `--simulate` dry runs and by tests. Plays complete instantly and
//! every buffer handed to the device is kept for inspection. Failures can be
//! injected to exercise the release-on-error path.

use crate::audio::device::{AudioPlatform, DeviceInfo, HostApi, OutputStream};
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One buffer as the device received it
#[derive(Debug, Clone)]
pub struct PlayedBuffer {
    pub device: String,
    pub samples: Vec<f32>,
}

#[derive(Debug, Default)]
struct Shared {
    played: Mutex<Vec<PlayedBuffer>>,
    open_streams: AtomicUsize,
    max_open_streams: AtomicUsize,
    plays_attempted: AtomicUsize,
    /// Zero-based play attempts that fail
    failing_plays: Mutex<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct VirtualPlatform {
    devices: Vec<DeviceInfo>,
    exclusive_supported: bool,
    shared: Arc<Shared>,
}

impl VirtualPlatform {
    /// Empty platform; add endpoints with [`VirtualPlatform::with_device`]
    pub fn new(exclusive_supported: bool) -> Self {
        Self {
            devices: Vec::new(),
            exclusive_supported,
            shared: Arc::new(Shared::default()),
        }
    }

    /// One exclusive endpoint, as a dry run expects
    pub fn simulated() -> Self {
        Self::new(true)
            .with_device("Simulated Output", HostApi::Virtual)
            .with_device("Simulated Output", HostApi::Asio)
    }

    pub fn with_device(mut self, name: &str, host_api: HostApi) -> Self {
        self.devices.push(DeviceInfo::new(name, host_api));
        self
    }

    /// Make the given zero-based play attempt fail
    pub fn fail_play(self, attempt: usize) -> Self {
        if let Ok(mut failing) = self.shared.failing_plays.lock() {
            failing.push(attempt);
        }
        self
    }

    pub fn played(&self) -> Vec<PlayedBuffer> {
        self.shared
            .played
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn play_count(&self) -> usize {
        self.shared.played.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Streams currently open
    pub fn open_streams(&self) -> usize {
        self.shared.open_streams.load(Ordering::SeqCst)
    }

    /// Most streams ever open at once
    pub fn max_open_streams(&self) -> usize {
        self.shared.max_open_streams.load(Ordering::SeqCst)
    }
}

impl AudioPlatform for VirtualPlatform {
    fn name(&self) -> &str {
        "virtual"
    }

    fn supports_exclusive_audio(&self) -> bool {
        self.exclusive_supported
    }

    fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }

    fn open_output(&self, device: &DeviceInfo, sample_rate: u32) -> Result<Box<dyn OutputStream>> {
        if !self.devices.contains(device) {
            return Err(Error::Device {
                device: device.name.clone(),
                reason: "no such virtual device".to_string(),
            });
        }
        let open = self.shared.open_streams.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_open_streams.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(VirtualStream {
            device: device.name.clone(),
            sample_rate,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct VirtualStream {
    device: String,
    sample_rate: u32,
    shared: Arc<Shared>,
}

impl OutputStream for VirtualStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn play_blocking(&mut self, samples: &[f32]) -> Result<()> {
        let attempt = self.shared.plays_attempted.fetch_add(1, Ordering::SeqCst);
        let fails = self
            .shared
            .failing_plays
            .lock()
            .map(|f| f.contains(&attempt))
            .unwrap_or(false);
        if fails {
            return Err(Error::Device {
                device: self.device.clone(),
                reason: format!("injected failure on play {}", attempt),
            });
        }

        let mut played = self
            .shared
            .played
            .lock()
            .map_err(|_| Error::Internal("virtual play log poisoned".to_string()))?;
        played.push(PlayedBuffer {
            device: self.device.clone(),
            samples: samples.to_vec(),
        });
        Ok(())
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        self.shared.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}
