//! # SPX Common Library
//!
//! Shared vocabulary for the SPX experiment runtime:
//! - Lever registry (validated, immutable experiment configuration)
//! - Config file resolution
//! - Section / exposure-context enums and session records
//! - Fade curve definitions for click suppression envelopes
//! - Session clock (monotonic + wall-clock timestamps)

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod levers;
pub mod time;

pub use error::{Error, Result};
pub use events::{DeviceMode, ExposureContext, Section, SessionRecord, StimulusKind};
pub use fade_curves::FadeCurve;
pub use levers::Levers;
