//! Exposure budget tracker
//!
//! Pure bookkeeping keyed by (stimulus, context, episode). MainTrial counts
//! live for the whole session; familiarization and reminder counts are scoped
//! to the checkpoint episode that produced them, so a reference clip can be
//! re-presented at every checkpoint without ever touching MainTrial budget.
//!
//! A unit is spent when the play is attempted, not when it finishes. A play
//! that fails half way has still exposed the subject to part of the stimulus.

use crate::error::{Error, Result};
use spx_common::{ExposureContext, Levers};
use std::collections::HashMap;
use tracing::error;

/// Episode number used for session-scoped MainTrial counts
pub const SESSION_EPISODE: u32 = 0;

/// Result of a consume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Play allowed; `play_number` counts this play (1-based)
    Granted { play_number: u32 },
    /// Budget exhausted; the counter was left unchanged
    Rejected { count: u32, budget: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ExposureKey {
    stimulus: String,
    context: ExposureContext,
    episode: u32,
}

/// Per-context play counters with fixed ceilings
#[derive(Debug, Clone)]
pub struct ExposureTracker {
    familiarization_budget: u32,
    main_trial_budget: u32,
    reminder_budget: u32,
    counts: HashMap<ExposureKey, u32>,
}

impl ExposureTracker {
    pub fn new(levers: &Levers) -> Self {
        Self {
            familiarization_budget: levers.familiarization_plays,
            main_trial_budget: levers.max_plays,
            reminder_budget: levers.reminder_plays,
            counts: HashMap::new(),
        }
    }

    /// Ceiling for a context
    pub fn budget(&self, context: ExposureContext) -> u32 {
        match context {
            ExposureContext::Familiarization => self.familiarization_budget,
            ExposureContext::MainTrial => self.main_trial_budget,
            ExposureContext::Reminder => self.reminder_budget,
        }
    }

    fn key(stimulus: &str, context: ExposureContext, episode: u32) -> ExposureKey {
        // MainTrial exposure is irreplaceable and never resets
        let episode = match context {
            ExposureContext::MainTrial => SESSION_EPISODE,
            _ => episode,
        };
        ExposureKey {
            stimulus: stimulus.to_string(),
            context,
            episode,
        }
    }

    /// Completed (attempted) plays so far
    pub fn count(&self, stimulus: &str, context: ExposureContext, episode: u32) -> u32 {
        self.counts
            .get(&Self::key(stimulus, context, episode))
            .copied()
            .unwrap_or(0)
    }

    /// Plays left before the ceiling
    pub fn remaining(&self, stimulus: &str, context: ExposureContext, episode: u32) -> u32 {
        self.budget(context)
            .saturating_sub(self.count(stimulus, context, episode))
    }

    /// Increment the counter iff it is below the ceiling
    pub fn try_consume(
        &mut self,
        stimulus: &str,
        context: ExposureContext,
        episode: u32,
    ) -> ConsumeOutcome {
        let budget = self.budget(context);
        let count = self
            .counts
            .entry(Self::key(stimulus, context, episode))
            .or_insert(0);

        if *count < budget {
            *count += 1;
            ConsumeOutcome::Granted {
                play_number: *count,
            }
        } else {
            ConsumeOutcome::Rejected {
                count: *count,
                budget,
            }
        }
    }

    /// Consume one unit or report a budget violation
    ///
    /// Schedulers size their plans to fit the budgets, so a rejection here
    /// means the scheduling logic is wrong and the session must halt.
    pub fn require(
        &mut self,
        stimulus: &str,
        context: ExposureContext,
        episode: u32,
    ) -> Result<u32> {
        match self.try_consume(stimulus, context, episode) {
            ConsumeOutcome::Granted { play_number } => Ok(play_number),
            ConsumeOutcome::Rejected { count, budget } => {
                error!(
                    stimulus = %stimulus,
                    context = %context,
                    count,
                    budget,
                    "Play attempted beyond exposure budget"
                );
                Err(Error::BudgetViolation {
                    stimulus: stimulus.to_string(),
                    context,
                    count,
                    budget,
                })
            }
        }
    }

    /// Highest count recorded for any stimulus in a context
    pub fn max_count(&self, context: ExposureContext) -> u32 {
        self.counts
            .iter()
            .filter(|(key, _)| key.context == context)
            .map(|(_, count)| *count)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(max_plays: u32, fam: u32, rem: u32) -> ExposureTracker {
        let levers = Levers {
            max_plays,
            familiarization_plays: fam,
            reminder_plays: rem,
            ..Levers::default()
        };
        ExposureTracker::new(&levers)
    }

    #[test]
    fn test_single_exposure_rejects_second_play() {
        let mut t = tracker(1, 1, 1);
        assert_eq!(
            t.try_consume("s1", ExposureContext::MainTrial, SESSION_EPISODE),
            ConsumeOutcome::Granted { play_number: 1 }
        );
        for _ in 0..3 {
            assert_eq!(
                t.try_consume("s1", ExposureContext::MainTrial, SESSION_EPISODE),
                ConsumeOutcome::Rejected { count: 1, budget: 1 }
            );
        }
        assert_eq!(t.count("s1", ExposureContext::MainTrial, SESSION_EPISODE), 1);
    }

    #[test]
    fn test_main_trial_ignores_episode() {
        let mut t = tracker(1, 1, 1);
        t.require("s1", ExposureContext::MainTrial, 3).unwrap();
        assert!(t.require("s1", ExposureContext::MainTrial, 7).is_err());
    }

    #[test]
    fn test_contexts_are_independent() {
        let mut t = tracker(1, 2, 1);
        t.require("s1", ExposureContext::Familiarization, 1).unwrap();
        t.require("s1", ExposureContext::Familiarization, 1).unwrap();
        t.require("s1", ExposureContext::Reminder, 1).unwrap();
        assert_eq!(t.remaining("s1", ExposureContext::MainTrial, SESSION_EPISODE), 1);
        t.require("s1", ExposureContext::MainTrial, SESSION_EPISODE).unwrap();
    }

    #[test]
    fn test_checkpoint_episodes_reset() {
        let mut t = tracker(1, 1, 1);
        t.require("ref", ExposureContext::Reminder, 1).unwrap();
        assert!(t.require("ref", ExposureContext::Reminder, 1).is_err());
        t.require("ref", ExposureContext::Reminder, 2).unwrap();
    }

    #[test]
    fn test_zero_budget_always_rejects() {
        let mut t = tracker(1, 0, 1);
        assert_eq!(
            t.try_consume("s1", ExposureContext::Familiarization, 1),
            ConsumeOutcome::Rejected { count: 0, budget: 0 }
        );
    }

    #[test]
    fn test_require_reports_context() {
        let mut t = tracker(1, 1, 1);
        t.require("s9", ExposureContext::MainTrial, SESSION_EPISODE).unwrap();
        match t.require("s9", ExposureContext::MainTrial, SESSION_EPISODE) {
            Err(Error::BudgetViolation {
                stimulus,
                context,
                count,
                budget,
            }) => {
                assert_eq!(stimulus, "s9");
                assert_eq!(context, ExposureContext::MainTrial);
                assert_eq!((count, budget), (1, 1));
            }
            other => panic!("expected budget violation, got {:?}", other),
        }
    }
}
