//! Section state machine
//!
//! Six sections in fixed order. `next` is the first later section not in the
//! skip set; there is no going back and no repetition. The session ends after
//! the last non-skipped section completes.

use crate::error::{Error, Result};
use spx_common::{Levers, Section};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    NotStarted,
    InSection(Section),
    Finished,
}

#[derive(Debug)]
pub struct SessionController {
    levers: Arc<Levers>,
    state: ControllerState,
    entered: Vec<Section>,
}

impl SessionController {
    pub fn new(levers: Arc<Levers>) -> Self {
        Self {
            levers,
            state: ControllerState::NotStarted,
            entered: Vec::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn current(&self) -> Option<Section> {
        match self.state {
            ControllerState::InSection(section) => Some(section),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == ControllerState::Finished
    }

    /// Sections entered so far, in order
    pub fn entered(&self) -> &[Section] {
        &self.entered
    }

    /// First non-skipped section strictly after `after` (or from the start)
    pub fn next_after(&self, after: Option<Section>) -> Option<Section> {
        let start = after.map(|s| s.index() + 1).unwrap_or(0);
        Section::ORDER
            .iter()
            .skip(start)
            .copied()
            .find(|s| !self.levers.is_skipped(*s))
    }

    /// Every section this session will enter, in order
    pub fn plan(&self) -> Vec<Section> {
        Section::ORDER
            .iter()
            .copied()
            .filter(|s| !self.levers.is_skipped(*s))
            .collect()
    }

    /// Enter the first section
    pub fn start(&mut self) -> Result<Section> {
        if self.state != ControllerState::NotStarted {
            return Err(Error::SectionOrder("session already started".to_string()));
        }
        let first = self
            .next_after(None)
            .ok_or_else(|| Error::Config("every section is skipped".to_string()))?;
        self.enter(first);
        Ok(first)
    }

    /// Completion signal for `completed`; returns the section entered next,
    /// or None when the session is over
    pub fn advance(&mut self, completed: Section) -> Result<Option<Section>> {
        match self.state {
            ControllerState::InSection(current) if current == completed => {
                match self.next_after(Some(current)) {
                    Some(next) => {
                        self.enter(next);
                        Ok(Some(next))
                    }
                    None => {
                        self.state = ControllerState::Finished;
                        Ok(None)
                    }
                }
            }
            ControllerState::InSection(current) => Err(Error::SectionOrder(format!(
                "completion for '{}' while in '{}'",
                completed, current
            ))),
            ControllerState::NotStarted => Err(Error::SectionOrder(format!(
                "completion for '{}' before the session started",
                completed
            ))),
            ControllerState::Finished => Err(Error::SectionOrder(format!(
                "completion for '{}' after the session finished",
                completed
            ))),
        }
    }

    fn enter(&mut self, section: Section) {
        self.state = ControllerState::InSection(section);
        self.entered.push(section);
    }
}
