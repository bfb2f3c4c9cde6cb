//! Click-suppression envelopes
//!
//! A fade-in ramp over the first frames and a fade-out ramp over the last
//! frames of a stimulus. The first sample and the last sample are exactly
//! zero; everything between the ramps is unity. Each ramp is applied only
//! when its lever is enabled and the stimulus is no longer than that lever's
//! duration threshold.

use spx_common::{FadeCurve, Levers};
use tracing::warn;

/// Frame-resolved envelope for one buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub fade_in_frames: usize,
    pub fade_out_frames: usize,
    pub fade_in_applied: bool,
    pub fade_out_applied: bool,
    frames: usize,
    curve: FadeCurve,
}

/// Saturates at `usize::MAX`; NaN and negative durations give 0
fn ms_to_frames(ms: f64, sample_rate: u32) -> usize {
    (ms * sample_rate as f64 / 1000.0).round() as usize
}

impl Envelope {
    /// Envelope for a buffer of `frames` at `sample_rate`
    pub fn for_buffer(levers: &Levers, frames: usize, sample_rate: u32) -> Self {
        let duration_ms = frames as f64 * 1000.0 / sample_rate as f64;
        let fade_in_applied = levers.fade_in.applies_to(duration_ms);
        let fade_out_applied = levers.fade_out.applies_to(duration_ms);

        // Neither ramp can be longer than the buffer
        let mut fade_in_frames = if fade_in_applied {
            ms_to_frames(levers.fade_in.duration_ms, sample_rate).min(frames)
        } else {
            0
        };
        let mut fade_out_frames = if fade_out_applied {
            ms_to_frames(levers.fade_out.duration_ms, sample_rate).min(frames)
        } else {
            0
        };

        // Ramps may not overlap: shrink both in proportion
        let total = fade_in_frames as u128 + fade_out_frames as u128;
        if total > frames as u128 {
            warn!(
                "Fade ramps ({} + {} frames) exceed stimulus length {}; shortening",
                fade_in_frames, fade_out_frames, frames
            );
            fade_in_frames = (fade_in_frames as u128 * frames as u128 / total) as usize;
            fade_out_frames = frames - fade_in_frames;
        }

        Self {
            fade_in_frames,
            fade_out_frames,
            fade_in_applied,
            fade_out_applied,
            frames,
            curve: levers.fade_curve,
        }
    }

    /// Multiplier for frame `index`
    pub fn gain_at(&self, index: usize) -> f64 {
        let mut gain = 1.0;
        if index < self.fade_in_frames {
            gain *= self
                .curve
                .calculate_fade_in(index as f64 / self.fade_in_frames as f64);
        }
        let out_start = self.frames.saturating_sub(self.fade_out_frames);
        if self.fade_out_frames > 0 && index >= out_start {
            let step = (index - out_start + 1) as f64;
            gain *= self
                .curve
                .calculate_fade_out(step / self.fade_out_frames as f64);
        }
        gain
    }

    /// True when some frame is not at unity
    pub fn is_active(&self) -> bool {
        self.fade_in_frames > 0 || self.fade_out_frames > 0
    }
}
