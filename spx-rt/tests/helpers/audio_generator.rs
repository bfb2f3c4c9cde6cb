//! Audio test signal generation
//!
//! Deterministic sine tones, either as in-memory mono buffers or written to
//! WAV files for the decode path.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Mono sine tone
pub fn tone(frequency_hz: f32, duration_ms: u64, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
    (0..frames)
        .map(|i| amplitude * (2.0 * PI * frequency_hz * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// 16-bit PCM WAV with the same tone on every channel
pub fn write_tone_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    for sample in tone(440.0, duration_ms, amplitude, sample_rate) {
        let value = (sample * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
