//! Exclusive, play-scoped device access
//!
//! The selected device is held only for the span of one play. Acquisition
//! opens the stream; dropping the guard closes it and frees the lock, so the
//! lock is released on every exit path including errors and unwinding.

use crate::audio::device::{AudioPlatform, DeviceInfo, OutputStream, Selection};
use crate::error::{Error, Result};
use spx_common::DeviceMode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The selected output device and its lock state
pub struct DeviceHandle {
    selection: Selection,
    platform: Arc<dyn AudioPlatform>,
    sample_rate: u32,
    held: AtomicBool,
}

impl DeviceHandle {
    pub fn new(selection: Selection, platform: Arc<dyn AudioPlatform>, sample_rate: u32) -> Self {
        Self {
            selection,
            platform,
            sample_rate,
            held: AtomicBool::new(false),
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.selection.device
    }

    pub fn mode(&self) -> DeviceMode {
        self.selection.mode()
    }

    pub fn degraded(&self) -> bool {
        self.selection.degraded
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Take the device for one play
    ///
    /// Fails with [`Error::DeviceBusy`] if a play is already in progress.
    pub fn acquire(&self) -> Result<DeviceGuard<'_>> {
        if self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::DeviceBusy(self.selection.device.name.clone()));
        }

        match self.platform.open_output(&self.selection.device, self.sample_rate) {
            Ok(stream) => {
                debug!("Acquired {}", self.selection.device.name);
                Ok(DeviceGuard {
                    handle: self,
                    stream: Some(stream),
                })
            }
            Err(e) => {
                self.held.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("device", &self.selection.device)
            .field("degraded", &self.selection.degraded)
            .field("held", &self.is_held())
            .finish()
    }
}

/// Scoped ownership of the open device
pub struct DeviceGuard<'a> {
    handle: &'a DeviceHandle,
    stream: Option<Box<dyn OutputStream>>,
}

impl DeviceGuard<'_> {
    pub fn play(&mut self, samples: &[f32]) -> Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.play_blocking(samples),
            None => Err(Error::Internal("device guard has no stream".to_string())),
        }
    }
}

impl Drop for DeviceGuard<'_> {
    fn drop(&mut self) {
        // Close the stream before anyone else may open the device
        self.stream.take();
        self.handle.held.store(false, Ordering::Release);
        debug!("Released {}", self.handle.selection.device.name);
    }
}
