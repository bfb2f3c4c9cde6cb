//! Stimulus playback: loudness normalization, fade envelopes, timed play

pub mod engine;
pub mod envelope;
pub mod loudness;

pub use engine::{Placement, PlaybackEngine, PreparedBuffer};
pub use envelope::Envelope;
pub use loudness::{Calibration, LevelPlan};
