//! Playback engine
//!
//! One call to [`PlaybackEngine::play`] is one exposure: shape the buffer
//! (gain and envelopes in a single f64 pass), take the device, play to the
//! last sample, release the device, and describe what happened.

use crate::audio::DeviceHandle;
use crate::error::{Error, Result};
use crate::playback::envelope::Envelope;
use crate::playback::loudness::{plan_level, Calibration, LevelPlan};
use crate::stimuli::Stimulus;
use spx_common::events::PresentationRecord;
use spx_common::time::SessionClock;
use spx_common::{ExposureContext, Levers};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Where in the session a play happens
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub block: String,
    pub block_index: usize,
    pub trial: Option<u32>,
    pub checkpoint: Option<u32>,
    pub context: ExposureContext,
    /// Budget unit this play consumed (1-based)
    pub play_number: u32,
}

/// A stimulus buffer ready for the device
#[derive(Debug, Clone)]
pub struct PreparedBuffer {
    pub samples: Vec<f32>,
    pub level: LevelPlan,
    pub envelope: Envelope,
    pub peak: f64,
}

pub struct PlaybackEngine {
    levers: Arc<Levers>,
    device: Arc<DeviceHandle>,
    calibration: Calibration,
    clock: SessionClock,
    session_id: Uuid,
}

impl PlaybackEngine {
    pub fn new(
        levers: Arc<Levers>,
        device: Arc<DeviceHandle>,
        calibration: Calibration,
        clock: SessionClock,
        session_id: Uuid,
    ) -> Self {
        Self {
            levers,
            device,
            calibration,
            clock,
            session_id,
        }
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn device(&self) -> &DeviceHandle {
        &self.device
    }

    /// Apply gain and envelopes to a copy of the stimulus buffer
    pub fn prepare(&self, stimulus: &Stimulus) -> PreparedBuffer {
        let level = plan_level(
            stimulus.rms_dbfs,
            stimulus.target_db,
            &self.levers,
            &self.calibration,
        );
        if level.clamped {
            warn!(
                stimulus = %stimulus.id,
                requested_db = level.requested_db,
                presented_db = level.presentation_level_db,
                "Requested level outside [{}, {}] dB; clamped",
                self.levers.min_db,
                self.levers.max_db
            );
        }

        let envelope = Envelope::for_buffer(&self.levers, stimulus.frames(), stimulus.sample_rate);
        let gain = level.linear_gain();

        let mut peak = 0.0f64;
        let samples = stimulus
            .samples()
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let v = s as f64 * gain * envelope.gain_at(i);
                peak = peak.max(v.abs());
                v as f32
            })
            .collect();

        if peak > 1.0 {
            warn!(
                stimulus = %stimulus.id,
                peak,
                "Normalized stimulus exceeds full scale and will clip"
            );
        }

        PreparedBuffer {
            samples,
            level,
            envelope,
            peak,
        }
    }

    /// Present one stimulus, blocking until the device has played it
    ///
    /// The device is held only inside this call and is released on every
    /// exit path.
    pub fn play(&self, stimulus: &Stimulus, placement: Placement) -> Result<PresentationRecord> {
        let prepared = self.prepare(stimulus);
        let device = self.device.device();

        let (start, end) = {
            let mut guard = self.device.acquire().map_err(|e| match e {
                Error::DeviceBusy(_) => e,
                other => self.playback_error(stimulus, placement.context, other),
            })?;
            let start = self.clock.stamp();
            guard
                .play(&prepared.samples)
                .map_err(|e| self.playback_error(stimulus, placement.context, e))?;
            (start, self.clock.stamp())
        };

        info!(
            stimulus = %stimulus.id,
            context = %placement.context,
            block = %placement.block,
            trial = ?placement.trial,
            play = placement.play_number,
            gain_db = prepared.level.gain_db,
            "Presented"
        );

        Ok(PresentationRecord {
            session_id: self.session_id,
            block: placement.block,
            block_index: placement.block_index,
            trial: placement.trial,
            checkpoint: placement.checkpoint,
            stimulus_id: stimulus.id.clone(),
            stimulus_kind: stimulus.kind,
            context: placement.context,
            play_number: placement.play_number,
            start,
            end,
            applied_gain_db: prepared.level.gain_db,
            presentation_level_db: prepared.level.presentation_level_db,
            level_clamped: prepared.level.clamped,
            fade_in_applied: prepared.envelope.fade_in_applied,
            fade_out_applied: prepared.envelope.fade_out_applied,
            device_name: device.name.clone(),
            device_mode: self.device.mode(),
            degraded: self.device.degraded(),
        })
    }

    fn playback_error(&self, stimulus: &Stimulus, context: ExposureContext, cause: Error) -> Error {
        let err = Error::Playback {
            stimulus: stimulus.id.clone(),
            context,
            device: self.device.device().name.clone(),
            reason: cause.to_string(),
        };
        tracing::error!("{}", err);
        err
    }
}
