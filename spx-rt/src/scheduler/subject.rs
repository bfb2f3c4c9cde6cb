//! Subject-facing interface used during the Blocks section
//!
//! The scheduler calls into this synchronously from its blocking thread; an
//! implementation may wait for as long as the subject needs.

/// What the subject (or operator) did after a trial presentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAction {
    /// Answer to the trial; ends it
    Respond(String),
    /// Ask to hear the stimulus again; honored only while budget remains
    Replay,
    /// Operator-forced replay; goes straight to the budget tracker and halts
    /// the session if the stimulus is exhausted
    OperatorRetry,
    /// End the session
    Abort(String),
}

/// State shown to the subject while a trial awaits a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPrompt<'a> {
    pub block: &'a str,
    /// 1-based trial within the block
    pub trial: u32,
    pub stimulus_id: &'a str,
    pub plays_used: u32,
    pub plays_remaining: u32,
}

pub trait SubjectInterface: Send {
    /// Familiarization is about to present `pool`
    fn familiarization(&mut self, _block: &str, _pool: &[String]) {}

    /// A reminder checkpoint fired after `trial` trials
    fn reminder(&mut self, _block: &str, _trial: u32) {}

    /// Wait for the subject's action on the current trial
    fn respond(&mut self, prompt: &TrialPrompt<'_>) -> SubjectAction;

    /// Break between blocks; returning false ends the session
    fn block_break(&mut self, _completed: &str, _next: &str) -> bool {
        true
    }
}
