//! Terminal front end
//!
//! Stands in for the GUI collaborator: the subject answers trials on stdin,
//! and the operator confirms each externally handled section with Enter.
//! `AutoSubject` and [`drive_sections`] in non-interactive mode let a dry
//! run complete the whole session unattended.

use crate::error::{Error, Result};
use crate::scheduler::{SubjectAction, SubjectInterface, TrialPrompt};
use crate::session::SessionHandle;
use spx_common::Section;
use std::io::{BufRead, Write};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One trimmed line from stdin; None on end of input
fn read_line() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

fn prompt(text: &str) {
    print!("{}", text);
    // A missing prompt is cosmetic
    let _ = std::io::stdout().flush();
}

/// Subject answering on the terminal
///
/// Any text is a response. `r` asks for a replay, `!` forces an operator
/// retry and `q` ends the session.
#[derive(Debug, Default)]
pub struct ConsoleSubject;

impl ConsoleSubject {
    pub fn new() -> Self {
        Self
    }
}

impl SubjectInterface for ConsoleSubject {
    fn familiarization(&mut self, block: &str, pool: &[String]) {
        println!("Familiarization for {}: {} clip(s)", block, pool.len());
    }

    fn reminder(&mut self, block: &str, trial: u32) {
        println!("Reminder ({} after trial {})", block, trial);
    }

    fn respond(&mut self, trial: &TrialPrompt<'_>) -> SubjectAction {
        loop {
            prompt(&format!(
                "[{} #{}] response (r = replay, {} left; q = quit): ",
                trial.block, trial.trial, trial.plays_remaining
            ));
            let Some(line) = read_line() else {
                return SubjectAction::Abort("console input closed".to_string());
            };
            match line.as_str() {
                "" => continue,
                "r" => return SubjectAction::Replay,
                "!" => return SubjectAction::OperatorRetry,
                "q" => return SubjectAction::Abort("quit at the console".to_string()),
                _ => return SubjectAction::Respond(line),
            }
        }
    }

    fn block_break(&mut self, completed: &str, next: &str) -> bool {
        prompt(&format!(
            "Finished {}. Press Enter to start {} (q to quit): ",
            completed, next
        ));
        matches!(read_line(), Some(line) if line != "q")
    }
}

/// Subject that answers every trial at once with a fixed response
#[derive(Debug, Clone)]
pub struct AutoSubject {
    response: String,
    answered: u32,
}

impl AutoSubject {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            answered: 0,
        }
    }

    pub fn answered(&self) -> u32 {
        self.answered
    }
}

impl SubjectInterface for AutoSubject {
    fn respond(&mut self, trial: &TrialPrompt<'_>) -> SubjectAction {
        self.answered += 1;
        debug!("Auto response for {} #{}", trial.block, trial.trial);
        SubjectAction::Respond(self.response.clone())
    }
}

/// Complete each externally handled section as the runner enters it
///
/// Interactive mode waits for the operator; otherwise sections complete
/// immediately and the level test reports no calibration. Returns when the
/// runner stops announcing sections.
pub async fn drive_sections(
    handle: SessionHandle,
    mut entered: mpsc::UnboundedReceiver<Section>,
    interactive: bool,
) -> Result<()> {
    while let Some(section) = entered.recv().await {
        if section == Section::Blocks {
            continue;
        }
        if !interactive {
            info!("Auto-completing section {}", section);
            if section == Section::AudioLevelTest {
                handle.complete_level_test(None).await?;
            } else {
                handle.complete(section).await?;
            }
            continue;
        }

        let (line, section) = tokio::task::spawn_blocking(move || {
            if section == Section::AudioLevelTest {
                prompt("Audio level test: measured dB SPL at 0 dBFS (blank for default, q to quit): ");
            } else {
                prompt(&format!("Section {}: press Enter when done (q to quit): ", section));
            }
            (read_line(), section)
        })
        .await
        .map_err(|e| Error::Internal(format!("console task failed: {}", e)))?;

        match line.as_deref() {
            None | Some("q") => {
                handle.abort(format!("operator quit during {}", section)).await?;
            }
            Some(text) if section == Section::AudioLevelTest => {
                let spl = if text.is_empty() {
                    None
                } else {
                    match text.parse::<f64>() {
                        Ok(value) => Some(value),
                        Err(_) => {
                            warn!("'{}' is not a number; using the default calibration", text);
                            None
                        }
                    }
                };
                handle.complete_level_test(spl).await?;
            }
            Some(_) => handle.complete(section).await?,
        }
    }
    Ok(())
}
