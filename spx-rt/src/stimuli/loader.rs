//! Stimulus asset loading
//!
//! Decodes a whole file with symphonia, down-mixes to mono f32 and resamples
//! to the session rate with rubato. Everything stays in f32 from decode to
//! device; no intermediate integer format is used.
//!
//! Unlike a music player, a stimulus with a single bad packet is not
//! playable: any read or decode error fails the load.

use crate::error::{Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decoded mono audio at its native rate
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub source_channels: usize,
}

fn asset_error(stimulus: &str, path: &Path, reason: impl Into<String>) -> Error {
    Error::Asset {
        stimulus: stimulus.to_string(),
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Decode an entire file to mono f32
pub fn decode_mono(stimulus: &str, path: &Path) -> Result<DecodedAudio> {
    debug!("Decoding stimulus {} from {}", stimulus, path.display());

    let file = std::fs::File::open(path)
        .map_err(|e| asset_error(stimulus, path, format!("cannot open file: {}", e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| asset_error(stimulus, path, format!("unrecognized format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| asset_error(stimulus, path, "no audio track"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| asset_error(stimulus, path, "sample rate not declared"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| asset_error(stimulus, path, format!("unsupported codec: {}", e)))?;

    let mut samples = Vec::new();
    let mut source_channels = 0usize;
    let mut interleaved: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(asset_error(stimulus, path, format!("read error: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| asset_error(stimulus, path, format!("corrupt packet: {}", e)))?;

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if channels == 0 {
            return Err(asset_error(stimulus, path, "zero-channel audio"));
        }
        source_channels = channels;

        let needed = decoded.capacity() as u64;
        let buf = interleaved.get_or_insert_with(|| SampleBuffer::<f32>::new(needed, spec));
        if (buf.capacity() as u64) < needed * channels as u64 {
            *buf = SampleBuffer::<f32>::new(needed, spec);
        }
        buf.copy_interleaved_ref(decoded);

        // Average channels; a mono stimulus presented on every output channel
        for frame in buf.samples().chunks(channels) {
            let sum: f32 = frame.iter().sum();
            samples.push(sum / channels as f32);
        }
    }

    if samples.is_empty() {
        return Err(asset_error(stimulus, path, "file contains no audio frames"));
    }

    debug!(
        "Decoded {}: {} frames at {}Hz from {} channel(s)",
        stimulus,
        samples.len(),
        sample_rate,
        source_channels
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        source_channels,
    })
}

/// Resample mono audio to the session rate
///
/// Returns the input unchanged when rates already match.
pub fn resample_mono(
    stimulus: &str,
    path: &Path,
    input: Vec<f32>,
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<f32>> {
    if input_rate == output_rate {
        return Ok(input);
    }

    debug!(
        "Resampling {} from {}Hz to {}Hz",
        stimulus, input_rate, output_rate
    );

    let frames = input.len();
    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        frames,
        1,
    )
    .map_err(|e| asset_error(stimulus, path, format!("cannot build resampler: {}", e)))?;

    let mut output = resampler
        .process(&[input], None)
        .map_err(|e| asset_error(stimulus, path, format!("resampling failed: {}", e)))?;

    output
        .pop()
        .ok_or_else(|| asset_error(stimulus, path, "resampler returned no channel"))
}

/// Decode and resample a stimulus file
pub fn load_mono(stimulus: &str, path: &Path, session_rate: u32) -> Result<Vec<f32>> {
    let decoded = decode_mono(stimulus, path)?;
    resample_mono(stimulus, path, decoded.samples, decoded.sample_rate, session_rate)
}
