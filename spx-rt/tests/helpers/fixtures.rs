//! Session building blocks for tests
//!
//! Everything runs against the virtual audio platform, so plays complete
//! immediately and every buffer is kept for inspection.

use super::audio_generator::tone;
use spx_common::time::SessionClock;
use spx_common::{Levers, StimulusKind};
use spx_rt::audio::{DeviceHandle, DeviceManager, VirtualPlatform};
use spx_rt::playback::{Calibration, PlaybackEngine};
use spx_rt::records::MemorySink;
use spx_rt::scheduler::{BlockScheduler, SubjectAction, SubjectInterface, TrialPrompt};
use spx_rt::stimuli::{Block, Randomizer, Stimulus, StimulusRegistry};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_RATE: u32 = 44100;

/// Levers from TOML, with the inter-trial pause removed
///
/// `extra` is appended after the pause line, so it may open tables.
pub fn levers(extra: &str) -> Arc<Levers> {
    let text = format!("inter_trial_pause_ms = 0\n{}", extra);
    Arc::new(Levers::from_toml_str(&text).expect("test levers should be valid"))
}

/// `prefix1`, `prefix2`, ... `prefixN`
pub fn trial_ids(prefix: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{}{}", prefix, i)).collect()
}

/// Registry of short tones, one per id, with the given blocks
pub fn tone_registry(ids: &[String], blocks: Vec<Block>) -> Arc<StimulusRegistry> {
    let stimuli = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            Stimulus::from_samples(
                id.clone(),
                StimulusKind::Target,
                PathBuf::from(format!("{}.wav", id)),
                tone(300.0 + 10.0 * i as f32, 50, 0.25, TEST_RATE),
                TEST_RATE,
            )
            .expect("tone stimulus")
        })
        .collect();
    Arc::new(StimulusRegistry::from_parts(stimuli, blocks, TEST_RATE).expect("test registry"))
}

/// Selected, lockable device on the virtual platform
pub fn device(levers: &Arc<Levers>, platform: &VirtualPlatform) -> Arc<DeviceHandle> {
    let manager = DeviceManager::new(Arc::clone(levers), Arc::new(platform.clone()));
    Arc::new(manager.handle().expect("virtual device selection"))
}

/// Scheduler wired to a memory sink, using the default calibration
pub fn scheduler(
    levers: &Arc<Levers>,
    registry: &Arc<StimulusRegistry>,
    platform: &VirtualPlatform,
    seed: u64,
) -> (BlockScheduler, Arc<MemorySink>) {
    let clock = SessionClock::start();
    let session_id = Uuid::new_v4();
    let engine = PlaybackEngine::new(
        Arc::clone(levers),
        device(levers, platform),
        Calibration::fallback(levers),
        clock,
        session_id,
    );
    let sink = Arc::new(MemorySink::new());
    let scheduler = BlockScheduler::new(
        Arc::clone(levers),
        Arc::clone(registry),
        Randomizer::new(seed),
        engine,
        sink.clone(),
        clock,
        session_id,
    );
    (scheduler, sink)
}

/// Subject that replays a fixed script, then answers "ok"
#[derive(Debug, Default)]
pub struct ScriptedSubject {
    script: VecDeque<SubjectAction>,
    /// Actions to repeat for every trial once the script is used up
    per_trial: Vec<SubjectAction>,
    pending: VecDeque<SubjectAction>,
    pub prompts: Vec<(String, u32, String)>,
    pub familiarizations: Vec<(String, usize)>,
    pub reminders: Vec<(String, u32)>,
    pub breaks: Vec<(String, String)>,
    /// Return false from the nth block break (0-based)
    pub stop_at_break: Option<usize>,
}

impl ScriptedSubject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(actions: Vec<SubjectAction>) -> Self {
        Self {
            script: actions.into(),
            ..Self::default()
        }
    }

    /// Every trial goes through `actions` before the final answer
    pub fn per_trial(actions: Vec<SubjectAction>) -> Self {
        Self {
            per_trial: actions,
            ..Self::default()
        }
    }
}

impl SubjectInterface for ScriptedSubject {
    fn familiarization(&mut self, block: &str, pool: &[String]) {
        self.familiarizations.push((block.to_string(), pool.len()));
    }

    fn reminder(&mut self, block: &str, trial: u32) {
        self.reminders.push((block.to_string(), trial));
    }

    fn respond(&mut self, prompt: &TrialPrompt<'_>) -> SubjectAction {
        let key = (prompt.block.to_string(), prompt.trial, prompt.stimulus_id.to_string());
        let first_prompt = self.prompts.last() != Some(&key);
        if first_prompt {
            self.pending = self.per_trial.clone().into();
        }
        self.prompts.push(key);

        if let Some(action) = self.script.pop_front() {
            return action;
        }
        self.pending
            .pop_front()
            .unwrap_or_else(|| SubjectAction::Respond("ok".to_string()))
    }

    fn block_break(&mut self, completed: &str, next: &str) -> bool {
        let index = self.breaks.len();
        self.breaks.push((completed.to_string(), next.to_string()));
        self.stop_at_break != Some(index)
    }
}
