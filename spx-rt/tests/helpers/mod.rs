//! Test helper modules for spx-rt integration tests
//!
//! - audio_generator: tone buffers and WAV fixtures
//! - fixtures: levers, registries, virtual devices and scripted subjects

#![allow(dead_code)]

pub mod audio_generator;
pub mod fixtures;

pub use audio_generator::{tone, write_tone_wav};
pub use fixtures::{
    device, levers, scheduler, tone_registry, trial_ids, ScriptedSubject, TEST_RATE,
};
