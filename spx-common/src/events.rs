//! Session vocabulary and exported records
//!
//! Section and exposure-context enums shared by the runtime and its
//! collaborators, plus the structured records the runtime hands to the
//! export collaborator. The runtime never writes these anywhere itself.

use crate::time::Stamp;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Top-level phase of a session, in fixed order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    AudioLevelTest,
    SubjectInfo,
    Consent,
    Intro,
    Blocks,
    Questionnaires,
}

impl Section {
    /// The fixed section order
    pub const ORDER: [Section; 6] = [
        Section::AudioLevelTest,
        Section::SubjectInfo,
        Section::Consent,
        Section::Intro,
        Section::Blocks,
        Section::Questionnaires,
    ];

    /// Position in the fixed order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Canonical lever-file spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::AudioLevelTest => "audio_level_test",
            Section::SubjectInfo => "subject_info",
            Section::Consent => "consent",
            Section::Intro => "intro",
            Section::Blocks => "blocks",
            Section::Questionnaires => "questionnaires",
        }
    }
}

impl FromStr for Section {
    type Err = Error;

    /// Case-insensitive; `_`, `-` and spaces are ignored so that
    /// `AudioLevelTest`, `audio_level_test` and `audio-level-test` all parse.
    fn from_str(s: &str) -> Result<Self> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match folded.as_str() {
            "audioleveltest" | "leveltest" => Ok(Section::AudioLevelTest),
            "subjectinfo" => Ok(Section::SubjectInfo),
            "consent" => Ok(Section::Consent),
            "intro" => Ok(Section::Intro),
            "blocks" => Ok(Section::Blocks),
            "questionnaires" => Ok(Section::Questionnaires),
            _ => Err(Error::InvalidInput(format!("Unknown section: '{}'", s))),
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Exposure category; each carries its own play budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureContext {
    Familiarization,
    MainTrial,
    Reminder,
}

impl ExposureContext {
    pub const ALL: [ExposureContext; 3] = [
        ExposureContext::Familiarization,
        ExposureContext::MainTrial,
        ExposureContext::Reminder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureContext::Familiarization => "familiarization",
            ExposureContext::MainTrial => "main_trial",
            ExposureContext::Reminder => "reminder",
        }
    }
}

impl std::fmt::Display for ExposureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the output device is being driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceMode {
    /// Sole low-latency control of the device, no system mixer in the path
    Exclusive,
    /// Shared-mode access through the system mixer
    Shared,
}

impl std::fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceMode::Exclusive => write!(f, "exclusive"),
            DeviceMode::Shared => write!(f, "shared"),
        }
    }
}

/// Role of a stimulus in the design
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StimulusKind {
    #[default]
    Target,
    Distractor,
    /// Reference clip used for familiarization and reminders
    Reference,
}

impl std::fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StimulusKind::Target => write!(f, "target"),
            StimulusKind::Distractor => write!(f, "distractor"),
            StimulusKind::Reference => write!(f, "reference"),
        }
    }
}

/// Where the loudness calibration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    /// Measured during the audio level test
    LevelTest,
    /// Level test skipped or produced no value; documented default applied
    Default,
}

/// How the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    /// Subject or operator ended the session
    Aborted,
    /// Integrity error (budget violation, asset or device failure)
    Halted,
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::Completed => write!(f, "completed"),
            SessionOutcome::Aborted => write!(f, "aborted"),
            SessionOutcome::Halted => write!(f, "halted"),
        }
    }
}

/// Session metadata emitted once, before the first section is entered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Randomizer seed; every presentation order is re-derivable from it
    pub seed: u64,
    pub lever_source: String,
    pub device_name: String,
    pub host_api: String,
    pub device_mode: DeviceMode,
    /// Shared-mode playback: latency/jitter profile differs from exclusive mode
    pub degraded: bool,
    pub degraded_reason: Option<String>,
    pub service_hardening: bool,
    /// Snapshot of every lever value
    pub levers: serde_json::Value,
}

/// One completed play of one stimulus in one exposure context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationRecord {
    pub session_id: Uuid,
    pub block: String,
    pub block_index: usize,
    /// Trial number within the block (main trials only, 1-based)
    pub trial: Option<u32>,
    /// Trial count at which a reminder checkpoint fired (reminders only)
    pub checkpoint: Option<u32>,
    pub stimulus_id: String,
    pub stimulus_kind: StimulusKind,
    pub context: ExposureContext,
    /// Completed plays of this stimulus in this context/episode, including this one
    pub play_number: u32,
    pub start: Stamp,
    pub end: Stamp,
    /// Linear gain applied to the sample buffer, in dB
    pub applied_gain_db: f64,
    /// Predicted presentation level after clamping, in dB SPL
    pub presentation_level_db: f64,
    /// True when the requested level fell outside the configured band
    pub level_clamped: bool,
    pub fade_in_applied: bool,
    pub fade_out_applied: bool,
    pub device_name: String,
    pub device_mode: DeviceMode,
    pub degraded: bool,
}

/// The subject's answer to one main trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub session_id: Uuid,
    pub block: String,
    pub block_index: usize,
    pub trial: u32,
    pub stimulus_id: String,
    pub stimulus_kind: StimulusKind,
    pub response: String,
    pub play_count: u32,
    pub trial_start: Stamp,
    pub first_play: Option<Stamp>,
    pub responded: Stamp,
}

/// Everything the runtime hands to the export collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum SessionRecord {
    SessionStarted(SessionMetadata),
    SectionEntered {
        section: Section,
        at: Stamp,
        /// Questionnaires to administer (Questionnaires section only)
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        plan: Vec<String>,
    },
    SectionCompleted {
        section: Section,
        at: Stamp,
    },
    Calibration {
        source: CalibrationSource,
        reference_spl_db: f64,
    },
    /// Block order for the session
    BlockOrder {
        seed: u64,
        blocks: Vec<String>,
    },
    /// Main-trial order for one block
    TrialOrder {
        block: String,
        block_index: usize,
        seed: u64,
        stimuli: Vec<String>,
    },
    Presentation(PresentationRecord),
    Response(ResponseRecord),
    SessionEnded {
        at: Stamp,
        outcome: SessionOutcome,
        reason: Option<String>,
    },
}

impl SessionRecord {
    /// Serialize as one JSON line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Internal(format!("Record encode failed: {}", e)))
    }
}
