//! Stimulus registry
//!
//! The manifest (TOML) names every stimulus asset and groups them into
//! blocks. At load every asset is decoded, down-mixed, resampled to the
//! session rate and measured; after that the registry is read-only.
//!
//! ```toml
//! [[stimuli]]
//! id = "s01"
//! path = "audio/s01.wav"
//! kind = "target"
//!
//! [[stimuli]]
//! id = "ref"
//! path = "audio/fullsentence.wav"
//! kind = "reference"
//!
//! [[blocks]]
//! name = "words"
//! trials = ["s01"]
//! familiarization = ["ref"]
//! ```

pub mod loader;
pub mod randomizer;

use crate::error::{Error, Result};
use serde::Deserialize;
use spx_common::StimulusKind;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub use randomizer::Randomizer;

/// One decoded, measured stimulus
#[derive(Debug, Clone)]
pub struct Stimulus {
    pub id: String,
    pub kind: StimulusKind,
    pub path: PathBuf,
    samples: Arc<[f32]>,
    pub sample_rate: u32,
    /// RMS level relative to digital full scale
    pub rms_dbfs: f64,
    /// Absolute peak sample
    pub peak: f32,
    /// Per-stimulus presentation level, overriding the lever
    pub target_db: Option<f64>,
}

impl Stimulus {
    /// Build from mono samples at the session rate, measuring level
    pub fn from_samples(
        id: impl Into<String>,
        kind: StimulusKind,
        path: PathBuf,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Result<Self> {
        let id = id.into();
        let (rms_dbfs, peak) = measure(&samples);

        if samples.is_empty() || !rms_dbfs.is_finite() {
            return Err(Error::Asset {
                stimulus: id,
                path: path.display().to_string(),
                reason: "stimulus is silent".to_string(),
            });
        }

        Ok(Self {
            id,
            kind,
            path,
            samples: samples.into(),
            sample_rate,
            rms_dbfs,
            peak,
            target_db: None,
        })
    }

    pub fn with_target_db(mut self, target_db: Option<f64>) -> Self {
        self.target_db = target_db;
        self
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// This stimulus preceded by `prefix` and `gap_ms` of silence
    ///
    /// The composite keeps this stimulus' identity (budgets and records are
    /// keyed on the trial stimulus) and is re-measured as a whole.
    pub fn with_prefix(&self, prefix: &Stimulus, gap_ms: u64) -> Result<Stimulus> {
        let gap_frames = (gap_ms as u128 * self.sample_rate as u128 / 1000) as usize;
        let mut samples = Vec::with_capacity(prefix.frames() + gap_frames + self.frames());
        samples.extend_from_slice(prefix.samples());
        samples.resize(samples.len() + gap_frames, 0.0);
        samples.extend_from_slice(self.samples());

        Ok(Stimulus::from_samples(
            self.id.clone(),
            self.kind,
            self.path.clone(),
            samples,
            self.sample_rate,
        )?
        .with_target_db(self.target_db))
    }
}

/// RMS in dBFS and absolute peak, computed in f64
pub fn measure(samples: &[f32]) -> (f64, f32) {
    if samples.is_empty() {
        return (f64::NEG_INFINITY, 0.0);
    }
    let mut sum_sq = 0.0f64;
    let mut peak = 0.0f32;
    for &s in samples {
        sum_sq += (s as f64) * (s as f64);
        peak = peak.max(s.abs());
    }
    let rms = (sum_sq / samples.len() as f64).sqrt();
    (20.0 * rms.log10(), peak)
}

/// Manifest entry for one stimulus
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StimulusEntry {
    pub id: String,
    /// Relative paths resolve against the manifest's directory
    pub path: PathBuf,
    #[serde(default)]
    pub kind: StimulusKind,
    pub target_db: Option<f64>,
}

/// A grouped sequence of trials sharing a stimulus set
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    pub name: String,
    pub trials: Vec<String>,
    /// Reference clips presented before the first trial
    #[serde(default)]
    pub familiarization: Vec<String>,
    /// Reference clips re-presented at reminder checkpoints
    #[serde(default)]
    pub reminder: Vec<String>,
    /// Clip prepended to every trial stimulus
    pub prefix: Option<String>,
    #[serde(default)]
    pub prefix_gap_ms: u64,
}

impl Block {
    pub fn new(name: impl Into<String>, trials: Vec<String>) -> Self {
        Self {
            name: name.into(),
            trials,
            familiarization: Vec::new(),
            reminder: Vec::new(),
            prefix: None,
            prefix_gap_ms: 0,
        }
    }

    /// Familiarization pool; the trial set when no reference pool is declared
    pub fn familiarization_pool(&self) -> &[String] {
        if self.familiarization.is_empty() {
            &self.trials
        } else {
            &self.familiarization
        }
    }

    /// Declared reminder pool, else the declared familiarization pool
    ///
    /// None when the block declares no reference clips at all.
    pub fn reminder_pool(&self) -> Option<&[String]> {
        if !self.reminder.is_empty() {
            Some(&self.reminder)
        } else if !self.familiarization.is_empty() {
            Some(&self.familiarization)
        } else {
            None
        }
    }
}

/// Parsed manifest file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub stimuli: Vec<StimulusEntry>,
    pub blocks: Vec<Block>,
}

impl Manifest {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Invalid manifest: {}", e)))
    }

    /// Read a manifest, resolving relative asset paths against its directory
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read manifest {}: {}", path.display(), e))
        })?;
        let mut manifest = Self::from_toml_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut manifest.stimuli {
            if entry.path.is_relative() {
                entry.path = base.join(&entry.path);
            }
        }
        Ok(manifest)
    }
}

/// Check that every block reference resolves and nothing is ambiguous
fn validate_design(ids: &HashSet<&str>, blocks: &[Block]) -> Result<()> {
    let mut problems = Vec::new();

    if blocks.is_empty() {
        problems.push("manifest declares no blocks".to_string());
    }

    let mut names = HashSet::new();
    for block in blocks {
        if !names.insert(block.name.as_str()) {
            problems.push(format!("block '{}' declared twice", block.name));
        }
        if block.trials.is_empty() {
            problems.push(format!("block '{}' has no trials", block.name));
        }

        let mut seen = HashSet::new();
        for id in &block.trials {
            if !seen.insert(id.as_str()) {
                problems.push(format!("block '{}' lists trial '{}' twice", block.name, id));
            }
        }

        let references = block
            .trials
            .iter()
            .chain(&block.familiarization)
            .chain(&block.reminder)
            .chain(block.prefix.iter());
        for id in references {
            if !ids.contains(id.as_str()) {
                problems.push(format!(
                    "block '{}' references unknown stimulus '{}'",
                    block.name, id
                ));
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(problems.join("; ")))
    }
}

/// Loaded stimuli and the block design
#[derive(Debug, Clone)]
pub struct StimulusRegistry {
    stimuli: HashMap<String, Arc<Stimulus>>,
    blocks: Vec<Block>,
    sample_rate: u32,
}

impl StimulusRegistry {
    /// Decode every manifest asset at the session rate
    ///
    /// Any missing or corrupt asset fails the whole load: a MainTrial
    /// exposure cannot be silently dropped later.
    pub fn load(manifest: &Manifest, sample_rate: u32) -> Result<Self> {
        let mut stimuli = Vec::with_capacity(manifest.stimuli.len());
        for entry in &manifest.stimuli {
            let samples = loader::load_mono(&entry.id, &entry.path, sample_rate)?;
            let stimulus =
                Stimulus::from_samples(&entry.id, entry.kind, entry.path.clone(), samples, sample_rate)?
                    .with_target_db(entry.target_db);
            stimuli.push(stimulus);
        }
        let registry = Self::from_parts(stimuli, manifest.blocks.clone(), sample_rate)?;
        info!(
            "Loaded {} stimuli in {} blocks at {}Hz",
            registry.stimuli.len(),
            registry.blocks.len(),
            sample_rate
        );
        Ok(registry)
    }

    /// Assemble from already-decoded stimuli
    pub fn from_parts(stimuli: Vec<Stimulus>, blocks: Vec<Block>, sample_rate: u32) -> Result<Self> {
        let mut map = HashMap::with_capacity(stimuli.len());
        for stimulus in stimuli {
            if stimulus.sample_rate != sample_rate {
                return Err(Error::Config(format!(
                    "stimulus '{}' is at {}Hz, session runs at {}Hz",
                    stimulus.id, stimulus.sample_rate, sample_rate
                )));
            }
            if stimulus.peak > 1.0 {
                warn!(stimulus = %stimulus.id, peak = stimulus.peak, "Stimulus exceeds full scale");
            }
            let id = stimulus.id.clone();
            if map.insert(id.clone(), Arc::new(stimulus)).is_some() {
                return Err(Error::Config(format!("stimulus '{}' declared twice", id)));
            }
        }

        let ids: HashSet<&str> = map.keys().map(|k| k.as_str()).collect();
        validate_design(&ids, &blocks)?;

        Ok(Self {
            stimuli: map,
            blocks,
            sample_rate,
        })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.stimuli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }

    pub fn get(&self, id: &str) -> Result<Arc<Stimulus>> {
        self.stimuli.get(id).cloned().ok_or_else(|| Error::Asset {
            stimulus: id.to_string(),
            path: String::new(),
            reason: "not in registry".to_string(),
        })
    }

    /// The buffer actually presented for a trial of `block`
    pub fn trial_stimulus(&self, block: &Block, id: &str) -> Result<Arc<Stimulus>> {
        let stimulus = self.get(id)?;
        match &block.prefix {
            Some(prefix_id) => {
                let prefix = self.get(prefix_id)?;
                Ok(Arc::new(stimulus.with_prefix(&prefix, block.prefix_gap_ms)?))
            }
            None => Ok(stimulus),
        }
    }
}
