//! Platform audio through cpal
//!
//! Every cpal host compiled into this build is enumerated, so the same
//! physical interface can appear once per host API (e.g. ASIO and WASAPI).
//! Only ASIO gives exclusive, mixer-free access through cpal; it is present
//! when the crate is built with the `asio` feature on Windows.
//!
//! A play builds a fresh output stream, feeds the buffer from the real-time
//! callback and blocks on a completion channel. The callback reports the
//! remaining output latency with its completion signal so that the caller
//! returns only after the final sample has left the device.

use crate::audio::device::{AudioPlatform, DeviceInfo, HostApi, OutputStream};
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, HostId, Sample, SampleFormat, SizedSample, StreamConfig};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

fn host_api(id: HostId) -> HostApi {
    match id.name() {
        "ASIO" => HostApi::Asio,
        "WASAPI" => HostApi::Wasapi,
        "CoreAudio" => HostApi::CoreAudio,
        "ALSA" => HostApi::Alsa,
        "JACK" => HostApi::Jack,
        _ => HostApi::Other,
    }
}

/// cpal-backed [`AudioPlatform`]
pub struct CpalPlatform {
    watchdog: Duration,
}

impl CpalPlatform {
    /// `watchdog` is the slack beyond a buffer's duration before a play is
    /// declared stalled
    pub fn new(watchdog: Duration) -> Self {
        Self { watchdog }
    }

    fn find_device(&self, info: &DeviceInfo) -> Result<cpal::Device> {
        let device_error = |reason: String| Error::Device {
            device: info.name.clone(),
            reason,
        };

        let id = cpal::available_hosts()
            .into_iter()
            .find(|id| host_api(*id) == info.host_api)
            .ok_or_else(|| device_error(format!("host API {} not available", info.host_api)))?;
        let host = cpal::host_from_id(id)
            .map_err(|e| device_error(format!("host {} unavailable: {}", id.name(), e)))?;

        let mut devices = host
            .output_devices()
            .map_err(|e| device_error(format!("failed to enumerate devices: {}", e)))?;
        devices
            .find(|d| d.name().ok().as_deref() == Some(info.name.as_str()))
            .ok_or_else(|| device_error("device disappeared".to_string()))
    }
}

impl AudioPlatform for CpalPlatform {
    fn name(&self) -> &str {
        "cpal"
    }

    fn supports_exclusive_audio(&self) -> bool {
        cpal::available_hosts()
            .into_iter()
            .any(|id| host_api(id).is_exclusive())
    }

    fn output_devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut found = Vec::new();
        for id in cpal::available_hosts() {
            let host = match cpal::host_from_id(id) {
                Ok(host) => host,
                Err(e) => {
                    warn!("Skipping host {}: {}", id.name(), e);
                    continue;
                }
            };
            let devices = match host.output_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    warn!("Cannot enumerate {} devices: {}", id.name(), e);
                    continue;
                }
            };
            for device in devices {
                if let Ok(name) = device.name() {
                    found.push(DeviceInfo::new(name, host_api(id)));
                }
            }
        }
        debug!("Found {} output endpoints", found.len());
        Ok(found)
    }

    fn open_output(&self, info: &DeviceInfo, sample_rate: u32) -> Result<Box<dyn OutputStream>> {
        let device = self.find_device(info)?;
        let (config, sample_format) = best_config(&device, info, sample_rate)?;
        debug!(
            "Opening {} at {}Hz, {} channel(s), {:?}",
            info.name, config.sample_rate.0, config.channels, sample_format
        );
        Ok(Box::new(CpalStream {
            name: info.name.clone(),
            device,
            config,
            sample_format,
            watchdog: self.watchdog,
        }))
    }
}

/// Config at the session rate, preferring f32 samples
///
/// The device must run at the session rate; stimuli are never resampled at
/// play time.
fn best_config(
    device: &cpal::Device,
    info: &DeviceInfo,
    sample_rate: u32,
) -> Result<(StreamConfig, SampleFormat)> {
    let ranges: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::Device {
            device: info.name.clone(),
            reason: format!("failed to get device configs: {}", e),
        })?
        .filter(|range| {
            range.min_sample_rate().0 <= sample_rate && range.max_sample_rate().0 >= sample_rate
        })
        .collect();

    for format in [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16] {
        if let Some(range) = ranges.iter().find(|r| r.sample_format() == format) {
            let config = range
                .clone()
                .with_sample_rate(cpal::SampleRate(sample_rate))
                .config();
            return Ok((config, format));
        }
    }

    Err(Error::Device {
        device: info.name.clone(),
        reason: format!("no supported f32/i16/u16 output config at {}Hz", sample_rate),
    })
}

type Completion = std::result::Result<Duration, String>;

struct CpalStream {
    name: String,
    device: cpal::Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    watchdog: Duration,
}

impl CpalStream {
    fn device_error(&self, reason: impl Into<String>) -> Error {
        Error::Device {
            device: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn build<T>(&self, buffer: Arc<[f32]>, done: mpsc::Sender<Completion>) -> Result<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels as usize;
        let rate = self.config.sample_rate.0 as f64;
        let error_tx = done.clone();
        let mut position = 0usize;
        let mut finished = false;

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let value = buffer.get(position).copied().unwrap_or(0.0);
                        position = position.saturating_add(1);
                        let out = T::from_sample(value.clamp(-1.0, 1.0));
                        for slot in frame.iter_mut() {
                            *slot = out;
                        }
                    }

                    if !finished && position >= buffer.len() {
                        finished = true;
                        let ts = info.timestamp();
                        let latency = ts.playback.duration_since(&ts.callback).unwrap_or_default();
                        let queued = (data.len() / channels.max(1)) as f64 / rate;
                        let _ = done.send(Ok(latency + Duration::from_secs_f64(queued)));
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    let _ = error_tx.send(Err(err.to_string()));
                },
                None,
            )
            .map_err(|e| self.device_error(format!("failed to build stream: {}", e)))
    }
}

impl OutputStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn play_blocking(&mut self, samples: &[f32]) -> Result<()> {
        let buffer: Arc<[f32]> = Arc::from(samples);
        let (tx, rx) = mpsc::channel();

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build::<f32>(buffer, tx)?,
            SampleFormat::I16 => self.build::<i16>(buffer, tx)?,
            SampleFormat::U16 => self.build::<u16>(buffer, tx)?,
            other => {
                return Err(self.device_error(format!("unsupported sample format {:?}", other)))
            }
        };

        stream
            .play()
            .map_err(|e| self.device_error(format!("failed to start stream: {}", e)))?;

        let duration = Duration::from_secs_f64(samples.len() as f64 / self.sample_rate() as f64);
        match rx.recv_timeout(duration + self.watchdog) {
            Ok(Ok(tail)) => {
                std::thread::sleep(tail);
                Ok(())
            }
            Ok(Err(reason)) => Err(self.device_error(reason)),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(self.device_error(format!(
                "playback stalled: no completion within {:?}",
                duration + self.watchdog
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(self.device_error("stream closed before completion"))
            }
        }
    }
}
