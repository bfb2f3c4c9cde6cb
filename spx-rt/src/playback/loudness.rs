//! Loudness normalization
//!
//! A stimulus' predicted presentation level is its RMS dBFS plus the
//! calibration offset (the SPL a 0 dBFS RMS signal produces at the
//! subject's ear). The gain maps that level onto the requested target,
//! after the target has been clamped into the configured band.

use spx_common::events::CalibrationSource;
use spx_common::Levers;

/// Reference SPL for 0 dBFS RMS on the session's output chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub reference_spl_db: f64,
    pub source: CalibrationSource,
}

impl Calibration {
    /// Value produced by the audio level test
    pub fn measured(reference_spl_db: f64) -> Self {
        Self {
            reference_spl_db,
            source: CalibrationSource::LevelTest,
        }
    }

    /// Documented default used when the level test did not run
    pub fn fallback(levers: &Levers) -> Self {
        Self {
            reference_spl_db: levers.default_calibration_spl_db,
            source: CalibrationSource::Default,
        }
    }
}

/// Gain decision for one stimulus
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPlan {
    /// Level asked for before clamping
    pub requested_db: f64,
    /// Level after clamping into [min_db, max_db]
    pub presentation_level_db: f64,
    pub gain_db: f64,
    pub clamped: bool,
}

impl LevelPlan {
    pub fn linear_gain(&self) -> f64 {
        db_to_linear(self.gain_db)
    }
}

pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Compute the gain for a stimulus measured at `rms_dbfs`
pub fn plan_level(
    rms_dbfs: f64,
    target_db: Option<f64>,
    levers: &Levers,
    calibration: &Calibration,
) -> LevelPlan {
    let requested_db = target_db.unwrap_or(levers.target_db);
    let presentation_level_db = requested_db.clamp(levers.min_db, levers.max_db);
    let natural_db = calibration.reference_spl_db + rms_dbfs;

    LevelPlan {
        requested_db,
        presentation_level_db,
        gain_db: presentation_level_db - natural_db,
        clamped: presentation_level_db != requested_db,
    }
}
