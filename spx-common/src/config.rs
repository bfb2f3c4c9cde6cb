//! Lever file resolution
//!
//! The lever file is located once at startup, following this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Per-user config file (`<config_dir>/spx/levers.toml`)
//! 4. None: compiled defaults are used

use crate::levers::Levers;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit lever file
pub const CONFIG_ENV_VAR: &str = "SPX_CONFIG";

/// Where the lever snapshot came from (recorded in session metadata)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeverSource {
    /// Explicit path given on the command line or through the environment
    File(PathBuf),
    /// Per-user config file found in the platform config directory
    UserConfig(PathBuf),
    /// No file found; compiled defaults
    Defaults,
}

impl std::fmt::Display for LeverSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeverSource::File(p) => write!(f, "file:{}", p.display()),
            LeverSource::UserConfig(p) => write!(f, "user:{}", p.display()),
            LeverSource::Defaults => write!(f, "defaults"),
        }
    }
}

/// Resolve which lever file to read.
///
/// An explicitly named file (CLI or env) that does not exist is a configuration
/// error: the operator asked for specific levers and must not silently get defaults.
pub fn resolve_lever_source(cli_arg: Option<&Path>, env_var_name: &str) -> Result<LeverSource> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return explicit(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return explicit(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config file
    if let Some(path) = user_config_path() {
        if path.exists() {
            return Ok(LeverSource::UserConfig(path));
        }
        debug!("No user lever file at {}", path.display());
    }

    // Priority 4: compiled defaults
    Ok(LeverSource::Defaults)
}

fn explicit(path: PathBuf) -> Result<LeverSource> {
    if path.exists() {
        Ok(LeverSource::File(path))
    } else {
        Err(Error::Config(format!(
            "Lever file not found: {}",
            path.display()
        )))
    }
}

/// Platform config path for the per-user lever file
fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("spx").join("levers.toml"))
}

/// Resolve, read and validate the lever snapshot.
pub fn load_levers(cli_arg: Option<&Path>) -> Result<(Levers, LeverSource)> {
    let source = resolve_lever_source(cli_arg, CONFIG_ENV_VAR)?;
    let levers = match &source {
        LeverSource::File(path) | LeverSource::UserConfig(path) => Levers::from_file(path)?,
        LeverSource::Defaults => {
            let levers = Levers::default();
            levers.validate()?;
            levers
        }
    };
    info!("Levers loaded from {}", source);
    Ok((levers, source))
}
