//! Stimulus asset loading tests
//!
//! **Test Coverage:**
//! - WAV decode with channel down-mix
//! - Resampling to the session rate at load
//! - Manifest parsing with relative asset paths
//! - Missing, corrupt and silent assets fail the load

mod helpers;

use helpers::{write_tone_wav, TEST_RATE};
use spx_common::StimulusKind;
use spx_rt::stimuli::loader::{decode_mono, load_mono};
use spx_rt::stimuli::{Manifest, StimulusRegistry};
use spx_rt::Error;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_stereo_wav_decodes_to_mono() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone_wav(&path, TEST_RATE, 2, 200, 0.5).unwrap();

    let decoded = decode_mono("tone", &path).unwrap();
    assert_eq!(decoded.sample_rate, TEST_RATE);
    assert_eq!(decoded.source_channels, 2);
    assert_eq!(decoded.samples.len(), (TEST_RATE / 5) as usize);

    // Identical channels average to the same signal
    let peak = decoded.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    assert!((peak - 0.5).abs() < 0.01, "peak {}", peak);
}

#[test]
fn test_asset_resampled_to_session_rate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone48k.wav");
    write_tone_wav(&path, 48000, 1, 500, 0.5).unwrap();

    let samples = load_mono("tone48k", &path, TEST_RATE).unwrap();
    let expected = (TEST_RATE / 2) as i64;
    assert!(
        (samples.len() as i64 - expected).abs() < 200,
        "expected about {} frames, got {}",
        expected,
        samples.len()
    );
}

#[test]
fn test_manifest_paths_resolve_against_its_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("audio")).unwrap();
    write_tone_wav(dir.path().join("audio/s1.wav"), TEST_RATE, 1, 100, 0.3).unwrap();
    write_tone_wav(dir.path().join("audio/s2.wav"), 22050, 2, 100, 0.3).unwrap();
    write_tone_wav(dir.path().join("audio/cue.wav"), TEST_RATE, 1, 50, 0.3).unwrap();

    let manifest_path = dir.path().join("manifest.toml");
    fs::write(
        &manifest_path,
        r#"
[[stimuli]]
id = "s1"
path = "audio/s1.wav"

[[stimuli]]
id = "s2"
path = "audio/s2.wav"
kind = "distractor"
target_db = 66.0

[[stimuli]]
id = "cue"
path = "audio/cue.wav"
kind = "reference"

[[blocks]]
name = "main"
trials = ["s1", "s2"]
familiarization = ["cue"]
prefix = "cue"
prefix_gap_ms = 100
"#,
    )
    .unwrap();

    let manifest = Manifest::from_file(&manifest_path).unwrap();
    assert!(manifest.stimuli.iter().all(|s| s.path.is_absolute()));

    let registry = StimulusRegistry::load(&manifest, TEST_RATE).unwrap();
    assert_eq!(registry.len(), 3);

    let s2 = registry.get("s2").unwrap();
    assert_eq!(s2.kind, StimulusKind::Distractor);
    assert_eq!(s2.target_db, Some(66.0));
    assert_eq!(s2.sample_rate, TEST_RATE);
    assert!((s2.duration_ms() - 100.0).abs() < 5.0);

    // Trial buffer: cue, 100 ms gap, then the trial stimulus
    let block = &registry.blocks()[0];
    let s1 = registry.get("s1").unwrap();
    let cue = registry.get("cue").unwrap();
    let trial = registry.trial_stimulus(block, "s1").unwrap();
    assert_eq!(trial.id, "s1");
    assert_eq!(
        trial.frames(),
        cue.frames() + (TEST_RATE / 10) as usize + s1.frames()
    );
}

#[test]
fn test_missing_asset_fails_load() {
    let dir = TempDir::new().unwrap();
    let manifest = Manifest::from_toml_str(&format!(
        "[[stimuli]]\nid = \"gone\"\npath = '{}'\n\n[[blocks]]\nname = \"b\"\ntrials = [\"gone\"]\n",
        dir.path().join("gone.wav").display()
    ))
    .unwrap();

    match StimulusRegistry::load(&manifest, TEST_RATE) {
        Err(Error::Asset { stimulus, .. }) => assert_eq!(stimulus, "gone"),
        other => panic!("expected an asset error, got {:?}", other.map(|r| r.len())),
    }
}

#[test]
fn test_corrupt_asset_fails_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("junk.wav");
    fs::write(&path, b"this is not audio at all").unwrap();

    let result = decode_mono("junk", &path);
    assert!(matches!(result, Err(Error::Asset { .. })));
}

#[test]
fn test_silent_asset_fails_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("silence.wav");
    write_tone_wav(&path, TEST_RATE, 1, 100, 0.0).unwrap();

    let manifest = Manifest::from_toml_str(&format!(
        "[[stimuli]]\nid = \"quiet\"\npath = '{}'\n\n[[blocks]]\nname = \"b\"\ntrials = [\"quiet\"]\n",
        path.display()
    ))
    .unwrap();

    let result = StimulusRegistry::load(&manifest, TEST_RATE);
    assert!(matches!(result, Err(Error::Asset { .. })));
}
