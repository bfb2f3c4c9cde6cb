//! # SPX Experiment Runtime (spx-rt)
//!
//! Runs a speech-perception listening session: sections in fixed order,
//! randomized blocks of trials, and stimulus playback under hard exposure
//! budgets with calibrated level, click-free envelopes and exclusive device
//! access.
//!
//! **Architecture:** symphonia + rubato load stimuli once per session; cpal
//! (or the in-process virtual platform) plays them one at a time. The session
//! runner is async; the block scheduler runs on a blocking thread because a
//! play holds its thread for the stimulus' duration.

pub mod audio;
pub mod console;
pub mod error;
pub mod exposure;
pub mod host;
pub mod playback;
pub mod records;
pub mod scheduler;
pub mod session;
pub mod stimuli;

pub use error::{Error, Result};
