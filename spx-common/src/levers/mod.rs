//! Experiment levers
//!
//! A lever is a named, validated configuration value controlling experiment
//! behavior: play budgets, reminder cadence, loudness band, device policy,
//! fade envelopes and skip sets.
//!
//! # Lifecycle
//!
//! Levers are read once at session start (TOML file or compiled defaults),
//! validated as a whole, and then frozen. The runtime wraps the snapshot in an
//! `Arc<Levers>` and hands a read-only reference to every component it
//! constructs; nothing writes a lever after that point.
//!
//! ```rust
//! use spx_common::levers::Levers;
//!
//! let levers = Levers::from_toml_str("max_plays = 1\nreminder_interval = 15\n").unwrap();
//! assert_eq!(levers.reminder_interval(), Some(15));
//! ```

use crate::events::Section;
use crate::fade_curves::FadeCurve;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

mod metadata;

/// Sentinel for `show_n`: present every stimulus in the block
pub const SHOW_ALL: i64 = -1;

/// Static description of one numeric lever
///
/// The metadata table returned by [`Levers::metadata`] is the single source of
/// truth for numeric lever names, defaults and validation ranges.
#[derive(Debug, Clone, Copy)]
pub struct LeverMetadata {
    pub key: &'static str,
    pub data_type: &'static str,
    pub default_value: &'static str,
    pub description: &'static str,
    pub validation_range: &'static str,
    pub validator: fn(f64) -> std::result::Result<(), String>,
}

/// Fade envelope settings for one end of a stimulus
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FadeLevers {
    pub enabled: bool,
    /// Ramp duration
    pub duration_ms: f64,
    /// Stimuli longer than this play without this ramp
    pub max_stimulus_ms: f64,
}

impl Default for FadeLevers {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: 10.0,
            max_stimulus_ms: 5000.0,
        }
    }
}

impl FadeLevers {
    /// True if a stimulus of this duration gets this ramp
    pub fn applies_to(&self, stimulus_ms: f64) -> bool {
        self.enabled && stimulus_ms <= self.max_stimulus_ms
    }
}

/// Set of sections to skip, parsed leniently from lever-file spellings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionSet(BTreeSet<Section>);

impl SectionSet {
    pub fn contains(&self, section: Section) -> bool {
        self.0.contains(&section)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.0.iter()
    }
}

impl FromIterator<Section> for SectionSet {
    fn from_iter<I: IntoIterator<Item = Section>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for SectionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        let mut set = BTreeSet::new();
        for name in names {
            let section: Section = name.parse().map_err(serde::de::Error::custom)?;
            if !set.insert(section) {
                return Err(serde::de::Error::custom(format!(
                    "section '{}' listed twice in skip_sections",
                    section
                )));
            }
        }
        Ok(Self(set))
    }
}

/// The immutable lever snapshot
///
/// Field defaults reproduce a live-experiment configuration. Every field may be
/// overridden from the lever file; unknown keys are rejected so that a typo
/// cannot silently leave a lever at its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Levers {
    // ---- Play budgets -------------------------------------------------------
    /// Main-trial plays per stimulus per session (`MAX_PLAYS`)
    pub max_plays: u32,
    /// Plays per reference stimulus per familiarization checkpoint
    pub familiarization_plays: u32,
    /// Plays per reference stimulus per reminder checkpoint
    pub reminder_plays: u32,

    // ---- Trial plan ---------------------------------------------------------
    /// Reminder every N main trials; zero or negative disables reminders
    pub reminder_interval: i64,
    /// Stimuli to present per block; `-1` presents all
    pub show_n: i64,
    /// Blank pause between trials
    pub inter_trial_pause_ms: u64,

    // ---- Loudness -----------------------------------------------------------
    /// Lower edge of the permitted presentation band (dB SPL)
    pub min_db: f64,
    /// Upper edge of the permitted presentation band (dB SPL)
    pub max_db: f64,
    /// Presentation level requested for stimuli without their own target
    pub target_db: f64,
    /// SPL produced by a 0 dBFS RMS signal when the level test was skipped
    pub default_calibration_spl_db: f64,
    /// Session sample rate; assets are resampled to it at load
    pub sample_rate: u32,

    // ---- Device policy ------------------------------------------------------
    /// Seek exclusive low-latency access (`FORCE_WASAPI_OR_ASIO_EXCLUSIVE`)
    pub force_exclusive: bool,
    /// Fail instead of degrading to shared mode when exclusivity is unavailable
    pub exclusive_required: bool,
    /// Prefer the named vendor's device on the lowest-latency exclusive API
    pub prefer_vendor_exclusive: bool,
    pub preferred_vendor: String,
    /// Explicit device name; overrides the selection policy when present
    pub audio_device: Option<String>,
    /// Slack added to a stimulus' duration before a play is declared stalled
    pub playback_watchdog_ms: u64,

    // ---- Click suppression --------------------------------------------------
    pub fade_in: FadeLevers,
    pub fade_out: FadeLevers,
    pub fade_curve: FadeCurve,

    // ---- Skip policy --------------------------------------------------------
    pub skip_sections: SectionSet,
    /// Questionnaires administered during the Questionnaires section, in order
    pub questionnaires: Vec<String>,
    pub skip_questionnaires: Vec<String>,
}

impl Default for Levers {
    fn default() -> Self {
        Self {
            max_plays: 1,
            familiarization_plays: 1,
            reminder_plays: 1,
            reminder_interval: 1,
            show_n: SHOW_ALL,
            inter_trial_pause_ms: 2000,
            min_db: 68.0,
            max_db: 70.0,
            target_db: 69.0,
            default_calibration_spl_db: 94.0,
            sample_rate: 44100,
            force_exclusive: true,
            exclusive_required: false,
            prefer_vendor_exclusive: true,
            preferred_vendor: "MOTU".to_string(),
            audio_device: None,
            playback_watchdog_ms: 2000,
            fade_in: FadeLevers::default(),
            fade_out: FadeLevers::default(),
            fade_curve: FadeCurve::default(),
            skip_sections: SectionSet::default(),
            questionnaires: [
                "recall",
                "tellegen",
                "vhq",
                "launay_slade",
                "dissociative_experiences",
                "flow_state_scale",
                "bais_v",
                "bais_c",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            skip_questionnaires: Vec::new(),
        }
    }
}

impl Levers {
    /// Parse and validate a lever file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read lever file {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate lever TOML
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let levers: Levers = toml::from_str(text)?;
        levers.validate()?;
        Ok(levers)
    }

    /// Current value of a numeric lever, by metadata key
    pub fn numeric_value(&self, key: &str) -> Option<f64> {
        let value = match key {
            "max_plays" => self.max_plays as f64,
            "familiarization_plays" => self.familiarization_plays as f64,
            "reminder_plays" => self.reminder_plays as f64,
            "reminder_interval" => self.reminder_interval as f64,
            "show_n" => self.show_n as f64,
            "inter_trial_pause_ms" => self.inter_trial_pause_ms as f64,
            "min_db" => self.min_db,
            "max_db" => self.max_db,
            "target_db" => self.target_db,
            "default_calibration_spl_db" => self.default_calibration_spl_db,
            "sample_rate" => self.sample_rate as f64,
            "playback_watchdog_ms" => self.playback_watchdog_ms as f64,
            "fade_in.duration_ms" => self.fade_in.duration_ms,
            "fade_in.max_stimulus_ms" => self.fade_in.max_stimulus_ms,
            "fade_out.duration_ms" => self.fade_out.duration_ms,
            "fade_out.max_stimulus_ms" => self.fade_out.max_stimulus_ms,
            _ => return None,
        };
        Some(value)
    }

    /// Validate the snapshot as a whole
    ///
    /// Collects every problem before failing so the operator can fix the lever
    /// file in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        for meta in Self::metadata() {
            match self.numeric_value(meta.key) {
                Some(value) => {
                    if let Err(e) = (meta.validator)(value) {
                        problems.push(e);
                    }
                }
                None => problems.push(format!("{}: no value accessor", meta.key)),
            }
        }

        if self.min_db > self.max_db {
            problems.push(format!(
                "min_db ({}) is above max_db ({})",
                self.min_db, self.max_db
            ));
        }

        for (name, fade) in [("fade_in", &self.fade_in), ("fade_out", &self.fade_out)] {
            if fade.enabled && fade.duration_ms > fade.max_stimulus_ms {
                problems.push(format!(
                    "{}.duration_ms ({}) is longer than {}.max_stimulus_ms ({})",
                    name, fade.duration_ms, name, fade.max_stimulus_ms
                ));
            }
        }

        if self.exclusive_required && !self.force_exclusive {
            problems.push("exclusive_required is set but force_exclusive is off".to_string());
        }

        if self.prefer_vendor_exclusive && self.preferred_vendor.trim().is_empty() {
            problems.push("prefer_vendor_exclusive is set but preferred_vendor is empty".to_string());
        }

        if self.skip_sections.len() == Section::ORDER.len() {
            problems.push("skip_sections names every section; nothing would run".to_string());
        }

        let mut seen = BTreeSet::new();
        for name in &self.questionnaires {
            if !seen.insert(name.as_str()) {
                problems.push(format!("questionnaire '{}' listed twice", name));
            }
        }
        let mut skipped = BTreeSet::new();
        for name in &self.skip_questionnaires {
            if !seen.contains(name.as_str()) {
                problems.push(format!("skip_questionnaires names unknown questionnaire '{}'", name));
            }
            if !skipped.insert(name.as_str()) {
                problems.push(format!("questionnaire '{}' skipped twice", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }

    /// Reminder cadence, or None when reminders are disabled
    pub fn reminder_interval(&self) -> Option<u32> {
        if self.reminder_interval > 0 {
            u32::try_from(self.reminder_interval).ok()
        } else {
            None
        }
    }

    /// Cap on stimuli per block, or None for "show all"
    pub fn show_cap(&self) -> Option<usize> {
        if self.show_n == SHOW_ALL {
            None
        } else {
            usize::try_from(self.show_n).ok()
        }
    }

    pub fn is_skipped(&self, section: Section) -> bool {
        self.skip_sections.contains(section)
    }

    /// Questionnaires to administer, in configured order
    pub fn questionnaire_plan(&self) -> Vec<String> {
        self.questionnaires
            .iter()
            .filter(|q| !self.skip_questionnaires.contains(q))
            .cloned()
            .collect()
    }

    /// Snapshot as a JSON value for session metadata
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
