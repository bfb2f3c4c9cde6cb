//! Async session driver
//!
//! Walks the controller through its sections. Every section except Blocks
//! belongs to an external handler, which reports completion through a
//! [`SessionHandle`]; the runner suspends on the signal channel until then.
//! Blocks runs the scheduler on a blocking thread, since a play holds the
//! calling thread for the stimulus' full duration.

use crate::audio::DeviceHandle;
use crate::error::{Error, Result};
use crate::host::HostCapabilities;
use crate::playback::{Calibration, PlaybackEngine};
use crate::records::RecordSink;
use crate::scheduler::{check_budgets, BlockScheduler, BlocksReport, SubjectInterface};
use crate::session::controller::SessionController;
use crate::stimuli::{Randomizer, StimulusRegistry};
use spx_common::events::{SessionMetadata, SessionOutcome};
use spx_common::time::SessionClock;
use spx_common::{Levers, Section, SessionRecord};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{error, info, warn};
use uuid::Uuid;

const SIGNAL_CAPACITY: usize = 16;

/// Message from a section's external handler
#[derive(Debug, Clone, PartialEq)]
pub enum SectionSignal {
    Complete {
        section: Section,
        /// SPL of a 0 dBFS RMS signal; reported by the audio level test
        calibration_spl_db: Option<f64>,
    },
    Abort {
        reason: String,
    },
}

/// Entry point for section handlers
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SectionSignal>,
}

impl SessionHandle {
    /// Deliver a signal to the runner
    pub async fn advance(&self, signal: SectionSignal) -> Result<()> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| Error::Channel("session is no longer running".to_string()))
    }

    pub async fn complete(&self, section: Section) -> Result<()> {
        self.advance(SectionSignal::Complete {
            section,
            calibration_spl_db: None,
        })
        .await
    }

    pub async fn complete_level_test(&self, calibration_spl_db: Option<f64>) -> Result<()> {
        self.advance(SectionSignal::Complete {
            section: Section::AudioLevelTest,
            calibration_spl_db,
        })
        .await
    }

    pub async fn abort(&self, reason: impl Into<String>) -> Result<()> {
        self.advance(SectionSignal::Abort {
            reason: reason.into(),
        })
        .await
    }
}

/// Everything a session is built from
pub struct SessionParts {
    pub levers: Arc<Levers>,
    pub registry: Arc<StimulusRegistry>,
    pub device: Arc<DeviceHandle>,
    pub randomizer: Randomizer,
    pub sink: Arc<dyn RecordSink>,
    pub host: Arc<dyn HostCapabilities>,
    /// Where the levers came from, for the metadata record
    pub lever_source: String,
}

#[derive(Debug)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub outcome: SessionOutcome,
    pub sections: Vec<Section>,
    pub blocks: Option<BlocksReport>,
}

pub struct SessionRunner {
    parts: SessionParts,
    session_id: Uuid,
    clock: SessionClock,
    controller: SessionController,
    signals: mpsc::Receiver<SectionSignal>,
    /// Completions that arrived while Blocks was running
    deferred: VecDeque<SectionSignal>,
    entered_tx: Option<mpsc::UnboundedSender<Section>>,
    calibration: Option<Calibration>,
}

impl SessionRunner {
    pub fn new(parts: SessionParts) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(SIGNAL_CAPACITY);
        let controller = SessionController::new(Arc::clone(&parts.levers));
        let runner = Self {
            parts,
            session_id: Uuid::new_v4(),
            clock: SessionClock::start(),
            controller,
            signals: rx,
            deferred: VecDeque::new(),
            entered_tx: None,
            calibration: None,
        };
        (runner, SessionHandle { tx })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Notifications of each section as it is entered
    pub fn sections(&mut self) -> mpsc::UnboundedReceiver<Section> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.entered_tx = Some(tx);
        rx
    }

    /// Run the session to its end
    ///
    /// A plan the budgets cannot cover is rejected before anything is
    /// recorded. Once started, every exit path records how the session ended.
    pub async fn run(mut self, subject: Box<dyn SubjectInterface>) -> Result<SessionSummary> {
        check_budgets(&self.parts.levers, &self.parts.registry)?;

        let host = Arc::clone(&self.parts.host);
        let hardened = if host.supports_service_hardening() {
            host.enter_experiment_mode()?;
            true
        } else {
            false
        };

        let result = self.run_sections(subject, hardened).await;
        self.log_unhandled_signals();

        if hardened {
            host.leave_experiment_mode();
        }

        let (outcome, reason) = match &result {
            Ok(_) => (SessionOutcome::Completed, None),
            Err(e) => (e.outcome(), Some(e.to_string())),
        };
        let ended = SessionRecord::SessionEnded {
            at: self.clock.stamp(),
            outcome,
            reason,
        };
        if let Err(e) = self.parts.sink.emit(ended) {
            warn!("Could not record session end: {}", e);
        }

        match result {
            Ok(blocks) => {
                info!("Session {} completed", self.session_id);
                Ok(SessionSummary {
                    session_id: self.session_id,
                    outcome,
                    sections: self.controller.entered().to_vec(),
                    blocks,
                })
            }
            Err(e) => {
                if e.is_fatal() {
                    error!("Session {} halted: {}", self.session_id, e);
                } else {
                    info!("Session {} ended early: {}", self.session_id, e);
                }
                Err(e)
            }
        }
    }

    fn emit(&self, record: SessionRecord) -> Result<()> {
        self.parts.sink.emit(record)
    }

    fn metadata(&self, hardened: bool) -> SessionMetadata {
        let device = &self.parts.device;
        SessionMetadata {
            session_id: self.session_id,
            started_at: self.clock.started_at(),
            seed: self.parts.randomizer.seed(),
            lever_source: self.parts.lever_source.clone(),
            device_name: device.device().name.clone(),
            host_api: device.device().host_api.to_string(),
            device_mode: device.mode(),
            degraded: device.degraded(),
            degraded_reason: device.selection().degraded_reason.clone(),
            service_hardening: hardened,
            levers: self.parts.levers.to_json(),
        }
    }

    async fn run_sections(
        &mut self,
        subject: Box<dyn SubjectInterface>,
        hardened: bool,
    ) -> Result<Option<BlocksReport>> {
        info!(
            "Session {} starting (seed {})",
            self.session_id,
            self.parts.randomizer.seed()
        );
        self.emit(SessionRecord::SessionStarted(self.metadata(hardened)))?;

        let mut subject = Some(subject);
        let mut blocks = None;
        let mut section = self.controller.start()?;

        loop {
            let plan = if section == Section::Questionnaires {
                self.parts.levers.questionnaire_plan()
            } else {
                Vec::new()
            };
            info!("Entering section {}", section);
            self.emit(SessionRecord::SectionEntered {
                section,
                at: self.clock.stamp(),
                plan,
            })?;
            if let Some(tx) = &self.entered_tx {
                // The listener is optional
                let _ = tx.send(section);
            }

            if section == Section::Blocks {
                let subject = subject
                    .take()
                    .ok_or_else(|| Error::Internal("Blocks entered twice".to_string()))?;
                blocks = Some(self.run_blocks(subject).await?);
            } else {
                self.await_completion(section).await?;
            }

            self.emit(SessionRecord::SectionCompleted {
                section,
                at: self.clock.stamp(),
            })?;
            if section == Section::Blocks {
                self.collect_signals_sent_during_blocks()?;
            }

            match self.controller.advance(section)? {
                Some(next) => section = next,
                None => break,
            }
        }

        Ok(blocks)
    }

    /// Take what handlers sent while the scheduler held the thread
    ///
    /// An abort ends the session here; completions wait for their section.
    fn collect_signals_sent_during_blocks(&mut self) -> Result<()> {
        loop {
            match self.signals.try_recv() {
                Ok(SectionSignal::Abort { reason }) => {
                    warn!("Abort requested during blocks: {}", reason);
                    return Err(Error::SessionAborted(reason));
                }
                Ok(signal) => self.deferred.push_back(signal),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn log_unhandled_signals(&mut self) {
        for signal in std::mem::take(&mut self.deferred) {
            warn!("Session {} ended with unhandled signal {:?}", self.session_id, signal);
        }
        while let Ok(signal) = self.signals.try_recv() {
            warn!("Session {} ended with unhandled signal {:?}", self.session_id, signal);
        }
    }

    async fn await_completion(&mut self, section: Section) -> Result<()> {
        let signal = match self.deferred.pop_front() {
            Some(signal) => Some(signal),
            None => self.signals.recv().await,
        };
        match signal {
            None => Err(Error::Channel(format!(
                "section handlers went away during '{}'",
                section
            ))),
            Some(SectionSignal::Abort { reason }) => Err(Error::SessionAborted(reason)),
            Some(SectionSignal::Complete {
                section: done,
                calibration_spl_db,
            }) => {
                if done != section {
                    return Err(Error::SectionOrder(format!(
                        "completion for '{}' while in '{}'",
                        done, section
                    )));
                }
                if section == Section::AudioLevelTest {
                    self.record_level_test(calibration_spl_db)?;
                }
                Ok(())
            }
        }
    }

    fn record_level_test(&mut self, spl: Option<f64>) -> Result<()> {
        match spl {
            Some(value) if value.is_finite() && value > 0.0 => {
                let calibration = Calibration::measured(value);
                info!("Level test calibration: {} dB SPL at 0 dBFS", value);
                self.emit(SessionRecord::Calibration {
                    source: calibration.source,
                    reference_spl_db: calibration.reference_spl_db,
                })?;
                self.calibration = Some(calibration);
            }
            Some(value) => warn!("Ignoring unusable level test result {}", value),
            None => warn!("Audio level test reported no calibration"),
        }
        Ok(())
    }

    /// Calibration from the level test, or the documented default
    fn blocks_calibration(&mut self) -> Result<Calibration> {
        if let Some(calibration) = self.calibration {
            return Ok(calibration);
        }
        let calibration = Calibration::fallback(&self.parts.levers);
        warn!(
            "No level test calibration; using default {} dB SPL at 0 dBFS",
            calibration.reference_spl_db
        );
        self.emit(SessionRecord::Calibration {
            source: calibration.source,
            reference_spl_db: calibration.reference_spl_db,
        })?;
        self.calibration = Some(calibration);
        Ok(calibration)
    }

    async fn run_blocks(&mut self, mut subject: Box<dyn SubjectInterface>) -> Result<BlocksReport> {
        let calibration = self.blocks_calibration()?;
        let engine = PlaybackEngine::new(
            Arc::clone(&self.parts.levers),
            Arc::clone(&self.parts.device),
            calibration,
            self.clock,
            self.session_id,
        );
        let scheduler = BlockScheduler::new(
            Arc::clone(&self.parts.levers),
            Arc::clone(&self.parts.registry),
            self.parts.randomizer,
            engine,
            Arc::clone(&self.parts.sink),
            self.clock,
            self.session_id,
        );

        tokio::task::spawn_blocking(move || scheduler.run(subject.as_mut()))
            .await
            .map_err(|e| Error::Internal(format!("scheduler task failed: {}", e)))?
    }
}
