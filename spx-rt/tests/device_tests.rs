//! Output device selection and locking tests
//!
//! **Test Coverage:**
//! - Selection policy: override, preferred vendor, first exclusive, shared fallback
//! - exclusive_required turns the shared fallback into a hard error
//! - Degraded flag carried on every presentation
//! - Device lock released after failed plays; one stream at a time

mod helpers;

use helpers::{levers, scheduler, tone_registry, trial_ids, ScriptedSubject};
use spx_common::DeviceMode;
use spx_rt::audio::{DeviceManager, HostApi, VirtualPlatform};
use spx_rt::stimuli::Block;
use spx_rt::Error;
use std::sync::Arc;

fn studio() -> VirtualPlatform {
    VirtualPlatform::new(true)
        .with_device("Speakers", HostApi::Wasapi)
        .with_device("Realtek HD", HostApi::WasapiExclusive)
        .with_device("MOTU M4", HostApi::Wasapi)
        .with_device("MOTU M4", HostApi::WasapiExclusive)
        .with_device("MOTU M4", HostApi::Asio)
}

fn select(toml: &str, platform: VirtualPlatform) -> spx_rt::Result<spx_rt::audio::Selection> {
    DeviceManager::new(levers(toml), Arc::new(platform)).select()
}

#[test]
fn test_preferred_vendor_on_lowest_latency_api() {
    let selection = select("", studio()).unwrap();
    assert_eq!(selection.device.name, "MOTU M4");
    assert_eq!(selection.device.host_api, HostApi::Asio);
    assert_eq!(selection.mode(), DeviceMode::Exclusive);
    assert!(!selection.degraded);
}

#[test]
fn test_vendor_match_ignores_case() {
    let selection = select("preferred_vendor = \"motu\"\n", studio()).unwrap();
    assert_eq!(selection.device.name, "MOTU M4");
}

#[test]
fn test_first_exclusive_without_vendor_device() {
    let platform = VirtualPlatform::new(true)
        .with_device("Speakers", HostApi::Wasapi)
        .with_device("Realtek HD", HostApi::WasapiExclusive)
        .with_device("Focusrite", HostApi::Asio);
    let selection = select("", platform).unwrap();
    assert_eq!(selection.device.name, "Realtek HD");
    assert!(!selection.degraded);
}

#[test]
fn test_named_device_overrides_policy() {
    let selection = select("audio_device = \"Realtek HD\"\n", studio()).unwrap();
    assert_eq!(selection.device.name, "Realtek HD");
    assert_eq!(selection.device.host_api, HostApi::WasapiExclusive);
}

#[test]
fn test_missing_named_device_falls_back_to_policy() {
    let selection = select("audio_device = \"Nope\"\n", studio()).unwrap();
    assert_eq!(selection.device.name, "MOTU M4");
    assert_eq!(selection.device.host_api, HostApi::Asio);
}

#[test]
fn test_no_exclusive_device_degrades() {
    let platform = VirtualPlatform::new(true)
        .with_device("Speakers", HostApi::Wasapi)
        .with_device("Built-in", HostApi::CoreAudio);
    let selection = select("", platform).unwrap();
    assert!(selection.degraded);
    assert_eq!(selection.mode(), DeviceMode::Shared);
    // Lowest-latency shared endpoint
    assert_eq!(selection.device.host_api, HostApi::CoreAudio);
    assert!(selection.degraded_reason.is_some());
}

#[test]
fn test_platform_without_exclusive_support_degrades() {
    let platform = VirtualPlatform::new(false)
        .with_device("MOTU M4", HostApi::Asio)
        .with_device("MOTU M4", HostApi::Wasapi);
    let selection = select("", platform).unwrap();
    assert!(selection.degraded);
    assert_eq!(selection.device.host_api, HostApi::Wasapi);
    assert!(selection
        .degraded_reason
        .unwrap()
        .contains("does not support exclusive"));
}

#[test]
fn test_exclusive_not_requested_degrades() {
    let selection = select("force_exclusive = false\n", studio()).unwrap();
    assert!(selection.degraded);
    assert_eq!(selection.mode(), DeviceMode::Shared);
}

#[test]
fn test_exclusive_required_fails_instead_of_degrading() {
    let platform = VirtualPlatform::new(true).with_device("Speakers", HostApi::Wasapi);
    let result = select("exclusive_required = true\n", platform);
    assert!(matches!(result, Err(Error::Device { .. })));
}

#[test]
fn test_no_devices_is_an_error() {
    let result = select("", VirtualPlatform::new(true));
    assert!(matches!(result, Err(Error::Device { .. })));
}

#[test]
fn test_degraded_flag_on_every_presentation() {
    let levers = levers("reminder_interval = 2\n");
    let trials = trial_ids("s", 4);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::new(true).with_device("Speakers", HostApi::Wasapi);
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 1);
    scheduler.run(&mut ScriptedSubject::new()).unwrap();

    let presentations = sink.presentations();
    assert!(!presentations.is_empty());
    for p in presentations {
        assert!(p.degraded, "{} ({}) not flagged", p.stimulus_id, p.context);
        assert_eq!(p.device_mode, DeviceMode::Shared);
        assert_eq!(p.device_name, "Speakers");
    }
}

#[test]
fn test_failed_play_releases_device_and_halts() {
    let levers = levers("reminder_interval = 0\nfamiliarization_plays = 0\n");
    let trials = trial_ids("s", 3);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated().fail_play(1);
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 4);

    match scheduler.run(&mut ScriptedSubject::new()) {
        Err(Error::Playback { device, .. }) => assert_eq!(device, "Simulated Output"),
        other => panic!("expected a playback error, got {:?}", other.map(|r| r.trials_run)),
    }
    assert_eq!(platform.open_streams(), 0);
    assert_eq!(sink.presentations().len(), 1);
}

#[test]
fn test_one_stream_at_a_time() {
    let levers = levers("reminder_interval = 3\nfamiliarization_plays = 2\n");
    let trials = trial_ids("s", 6);
    let registry = tone_registry(&trials, vec![Block::new("b1", trials.clone())]);

    let platform = VirtualPlatform::simulated();
    let (scheduler, sink) = scheduler(&levers, &registry, &platform, 8);
    scheduler.run(&mut ScriptedSubject::new()).unwrap();

    assert_eq!(platform.max_open_streams(), 1);
    assert_eq!(platform.open_streams(), 0);
    assert_eq!(platform.play_count(), sink.presentations().len());
}

#[test]
fn test_second_acquire_is_busy() {
    let levers = levers("");
    let platform = VirtualPlatform::simulated();
    let device = helpers::device(&levers, &platform);

    let guard = device.acquire().unwrap();
    assert!(device.is_held());
    assert!(matches!(device.acquire(), Err(Error::DeviceBusy(_))));
    drop(guard);
    assert!(!device.is_held());
    assert!(device.acquire().is_ok());
}
