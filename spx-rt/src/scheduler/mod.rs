//! Block/trial scheduler
//!
//! Drives the Blocks section. For each block, in randomized order:
//!
//! 1. familiarization: every clip in the block's familiarization pool,
//!    `familiarization_plays` times each
//! 2. main trials in randomized order, one MainTrial unit per presentation
//! 3. a reminder checkpoint every `reminder_interval` trials within the
//!    block. It re-presents the block's reference pool or, when none is
//!    declared, the trials run since the previous checkpoint
//! 4. a break before the next block
//!
//! Every play goes through the exposure tracker first. A rejection there is a
//! scheduling bug and halts the session.

pub mod subject;

use crate::error::{Error, Result};
use crate::exposure::{ExposureTracker, SESSION_EPISODE};
use crate::playback::{Placement, PlaybackEngine};
use crate::records::RecordSink;
use crate::stimuli::{Block, Randomizer, Stimulus, StimulusRegistry};
use spx_common::events::{PresentationRecord, ResponseRecord};
use spx_common::time::{millis_to_duration, SessionClock};
use spx_common::{ExposureContext, Levers, SessionRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use subject::{SubjectAction, SubjectInterface, TrialPrompt};

/// Position within the Blocks section
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrialCursor {
    /// Position of the current block in session order
    pub block_index: usize,
    /// Trials started in the current block
    pub trial_in_block: u32,
    /// Trials since the last checkpoint, or since the block started
    pub since_reminder: u32,
    /// Trials started in the session
    pub total_trials: u32,
}

impl TrialCursor {
    fn enter_block(&mut self, block_index: usize) {
        self.block_index = block_index;
        self.trial_in_block = 0;
        self.since_reminder = 0;
    }

    fn advance(&mut self) {
        self.trial_in_block += 1;
        self.since_reminder += 1;
        self.total_trials += 1;
    }

    fn reminder_done(&mut self) {
        self.since_reminder = 0;
    }
}

/// A reminder checkpoint that fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub block: String,
    pub block_index: usize,
    /// Trial count in the block when it fired
    pub trial: u32,
}

/// What the Blocks section did
#[derive(Debug, Clone)]
pub struct BlocksReport {
    pub block_order: Vec<String>,
    pub trials_run: u32,
    pub checkpoints: Vec<Checkpoint>,
    pub tracker: ExposureTracker,
}

/// Reject trial plans the MainTrial budget cannot cover
///
/// A stimulus listed in the trials of several blocks needs one MainTrial unit
/// per block.
pub fn check_budgets(levers: &Levers, registry: &StimulusRegistry) -> Result<()> {
    let mut occurrences: BTreeMap<&str, u32> = BTreeMap::new();
    for block in registry.blocks() {
        for id in &block.trials {
            *occurrences.entry(id.as_str()).or_default() += 1;
        }
    }

    let over: Vec<String> = occurrences
        .iter()
        .filter(|(_, &n)| n > levers.max_plays)
        .map(|(id, n)| format!("{} ({} blocks)", id, n))
        .collect();

    if over.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "max_plays = {} cannot cover stimuli used as trials in several blocks: {}",
            levers.max_plays,
            over.join(", ")
        )))
    }
}

pub struct BlockScheduler {
    levers: Arc<Levers>,
    registry: Arc<StimulusRegistry>,
    randomizer: Randomizer,
    engine: PlaybackEngine,
    tracker: ExposureTracker,
    sink: Arc<dyn RecordSink>,
    clock: SessionClock,
    session_id: Uuid,
    cursor: TrialCursor,
    reminder_episodes: u32,
    checkpoints: Vec<Checkpoint>,
}

impl BlockScheduler {
    pub fn new(
        levers: Arc<Levers>,
        registry: Arc<StimulusRegistry>,
        randomizer: Randomizer,
        engine: PlaybackEngine,
        sink: Arc<dyn RecordSink>,
        clock: SessionClock,
        session_id: Uuid,
    ) -> Self {
        let tracker = ExposureTracker::new(&levers);
        Self {
            levers,
            registry,
            randomizer,
            engine,
            tracker,
            sink,
            clock,
            session_id,
            cursor: TrialCursor::default(),
            reminder_episodes: 0,
            checkpoints: Vec::new(),
        }
    }

    pub fn cursor(&self) -> TrialCursor {
        self.cursor
    }

    pub fn tracker(&self) -> &ExposureTracker {
        &self.tracker
    }

    /// Run every block to completion
    pub fn run(mut self, subject: &mut dyn SubjectInterface) -> Result<BlocksReport> {
        let registry = Arc::clone(&self.registry);
        let blocks = registry.blocks();

        let (block_seed, order) = self.randomizer.block_order(blocks.len());
        let block_order: Vec<String> = order.iter().map(|&i| blocks[i].name.clone()).collect();
        info!("Block order (seed {}): {:?}", block_seed, block_order);
        self.sink.emit(SessionRecord::BlockOrder {
            seed: block_seed,
            blocks: block_order.clone(),
        })?;

        for (position, &slot) in order.iter().enumerate() {
            let block = &blocks[slot];
            self.run_block(subject, block, position, slot)?;

            if let Some(&next) = order.get(position + 1) {
                if !subject.block_break(&block.name, &blocks[next].name) {
                    return Err(Error::SessionAborted(format!(
                        "ended at the break after block '{}'",
                        block.name
                    )));
                }
            }
        }

        Ok(BlocksReport {
            block_order,
            trials_run: self.cursor.total_trials,
            checkpoints: self.checkpoints,
            tracker: self.tracker,
        })
    }

    fn run_block(
        &mut self,
        subject: &mut dyn SubjectInterface,
        block: &Block,
        position: usize,
        slot: usize,
    ) -> Result<()> {
        info!("Starting block {} ({})", position + 1, block.name);
        self.cursor.enter_block(position);
        self.familiarize(subject, block, position)?;

        let (seed, trials) = self
            .randomizer
            .trial_order(slot, &block.trials, self.levers.show_cap());
        debug!("Trial order for {} (seed {}): {:?}", block.name, seed, trials);
        self.sink.emit(SessionRecord::TrialOrder {
            block: block.name.clone(),
            block_index: position,
            seed,
            stimuli: trials.clone(),
        })?;

        let interval = self.levers.reminder_interval();
        if interval.is_some() && block.reminder_pool().is_none() {
            warn!(
                "Block {} declares no reference clips; reminders replay the trials since the last checkpoint",
                block.name
            );
        }

        let pause = millis_to_duration(self.levers.inter_trial_pause_ms);
        let mut since_checkpoint: Vec<&str> = Vec::new();
        for (i, id) in trials.iter().enumerate() {
            if i > 0 && !pause.is_zero() {
                std::thread::sleep(pause);
            }

            self.cursor.advance();
            self.run_trial(subject, block, id)?;
            since_checkpoint.push(id.as_str());

            if interval == Some(self.cursor.since_reminder) {
                let pool: Vec<&str> = match block.reminder_pool() {
                    Some(pool) => pool.iter().map(String::as_str).collect(),
                    None => std::mem::take(&mut since_checkpoint),
                };
                self.remind(subject, block, &pool)?;
                since_checkpoint.clear();
            }
        }

        info!(
            "Finished block {} ({}): {} trials",
            position + 1,
            block.name,
            self.cursor.trial_in_block
        );
        Ok(())
    }

    fn familiarize(
        &mut self,
        subject: &mut dyn SubjectInterface,
        block: &Block,
        position: usize,
    ) -> Result<()> {
        let plays = self.levers.familiarization_plays;
        let pool = block.familiarization_pool();
        if plays == 0 || pool.is_empty() {
            debug!("No familiarization for {}", block.name);
            return Ok(());
        }

        subject.familiarization(&block.name, pool);
        let episode = position as u32 + 1;
        for id in pool {
            let stimulus = self.registry.get(id)?;
            for _ in 0..plays {
                self.present(&stimulus, block, ExposureContext::Familiarization, episode, None, None)?;
            }
        }
        Ok(())
    }

    fn remind(
        &mut self,
        subject: &mut dyn SubjectInterface,
        block: &Block,
        pool: &[&str],
    ) -> Result<()> {
        let trial = self.cursor.trial_in_block;
        info!("Reminder checkpoint in {} after trial {}", block.name, trial);

        self.reminder_episodes += 1;
        let episode = self.reminder_episodes;
        self.checkpoints.push(Checkpoint {
            block: block.name.clone(),
            block_index: self.cursor.block_index,
            trial,
        });
        subject.reminder(&block.name, trial);

        for &id in pool {
            let stimulus = self.registry.get(id)?;
            for _ in 0..self.levers.reminder_plays {
                self.present(&stimulus, block, ExposureContext::Reminder, episode, None, Some(trial))?;
            }
        }
        self.cursor.reminder_done();
        Ok(())
    }

    fn run_trial(
        &mut self,
        subject: &mut dyn SubjectInterface,
        block: &Block,
        id: &str,
    ) -> Result<()> {
        let trial = self.cursor.trial_in_block;
        let stimulus = self.registry.trial_stimulus(block, id)?;
        let trial_start = self.clock.stamp();

        let first = self.present_main(&stimulus, block, trial)?;

        loop {
            let plays_used = self.tracker.count(id, ExposureContext::MainTrial, SESSION_EPISODE);
            let plays_remaining =
                self.tracker.remaining(id, ExposureContext::MainTrial, SESSION_EPISODE);
            let prompt = TrialPrompt {
                block: &block.name,
                trial,
                stimulus_id: id,
                plays_used,
                plays_remaining,
            };

            match subject.respond(&prompt) {
                SubjectAction::Respond(response) => {
                    self.sink.emit(SessionRecord::Response(ResponseRecord {
                        session_id: self.session_id,
                        block: block.name.clone(),
                        block_index: self.cursor.block_index,
                        trial,
                        stimulus_id: id.to_string(),
                        stimulus_kind: stimulus.kind,
                        response,
                        play_count: plays_used,
                        trial_start,
                        first_play: Some(first.start),
                        responded: self.clock.stamp(),
                    }))?;
                    return Ok(());
                }
                SubjectAction::Replay if plays_remaining > 0 => {
                    self.present_main(&stimulus, block, trial)?;
                }
                SubjectAction::Replay => {
                    warn!(
                        stimulus = %id,
                        plays_used,
                        "Replay refused: MainTrial budget exhausted"
                    );
                }
                SubjectAction::OperatorRetry => {
                    self.present_main(&stimulus, block, trial)?;
                }
                SubjectAction::Abort(reason) => {
                    return Err(Error::SessionAborted(reason));
                }
            }
        }
    }

    fn present_main(
        &mut self,
        stimulus: &Stimulus,
        block: &Block,
        trial: u32,
    ) -> Result<PresentationRecord> {
        self.present(
            stimulus,
            block,
            ExposureContext::MainTrial,
            SESSION_EPISODE,
            Some(trial),
            None,
        )
    }

    fn present(
        &mut self,
        stimulus: &Stimulus,
        block: &Block,
        context: ExposureContext,
        episode: u32,
        trial: Option<u32>,
        checkpoint: Option<u32>,
    ) -> Result<PresentationRecord> {
        let play_number = self.tracker.require(&stimulus.id, context, episode)?;
        let record = self.engine.play(
            stimulus,
            Placement {
                block: block.name.clone(),
                block_index: self.cursor.block_index,
                trial,
                checkpoint,
                context,
                play_number,
            },
        )?;
        self.sink.emit(SessionRecord::Presentation(record.clone()))?;
        Ok(record)
    }
}
