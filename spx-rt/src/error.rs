//! Error types for spx-rt
//!
//! Every variant that can compromise exposure counts or timing integrity
//! carries the stimulus, context and device involved so the operator can
//! diagnose from the log alone.

use spx_common::events::SessionOutcome;
use spx_common::ExposureContext;
use thiserror::Error;

/// Main error type for the runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid lever value or manifest
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stimulus audio missing, unreadable or corrupt
    #[error("Asset error for stimulus '{stimulus}' ({path}): {reason}")]
    Asset {
        stimulus: String,
        path: String,
        reason: String,
    },

    /// Output device could not be enumerated, selected or opened
    #[error("Audio device error on '{device}': {reason}")]
    Device { device: String, reason: String },

    /// A second play tried to take a device that is already held
    #[error("Audio device '{0}' is already held by another play")]
    DeviceBusy(String),

    /// A play was attempted beyond its context's budget
    #[error(
        "Budget violation: stimulus '{stimulus}' already has {count} of {budget} {context} plays"
    )]
    BudgetViolation {
        stimulus: String,
        context: ExposureContext,
        count: u32,
        budget: u32,
    },

    /// Playback started but did not complete
    #[error("Playback of '{stimulus}' ({context}) failed on '{device}': {reason}")]
    Playback {
        stimulus: String,
        context: ExposureContext,
        device: String,
        reason: String,
    },

    /// Completion signal for a section that is not the current one
    #[error("Section order error: {0}")]
    SectionOrder(String),

    /// Subject or operator ended the session
    #[error("Session aborted: {0}")]
    SessionAborted(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Signal channel closed while the session was waiting on it
    #[error("Channel closed: {0}")]
    Channel(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<spx_common::Error> for Error {
    fn from(err: spx_common::Error) -> Self {
        match err {
            spx_common::Error::Io(e) => Error::Io(e),
            spx_common::Error::Internal(msg) => Error::Internal(msg),
            other => Error::Config(other.to_string()),
        }
    }
}

impl Error {
    /// True when the error leaves exposure counts or timing in doubt
    ///
    /// A deliberate abort is a normal, if early, end of the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::SessionAborted(_))
    }

    /// How a session ending with this error is recorded
    pub fn outcome(&self) -> SessionOutcome {
        if self.is_fatal() {
            SessionOutcome::Halted
        } else {
            SessionOutcome::Aborted
        }
    }
}

/// Convenience Result type using spx-rt Error
pub type Result<T> = std::result::Result<T, Error>;
