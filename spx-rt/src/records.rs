//! Hand-off to the export collaborator
//!
//! The runtime emits [`SessionRecord`]s and never writes them anywhere
//! itself. A sink either forwards them over a channel to whatever persists
//! them or keeps them in memory.

use crate::error::{Error, Result};
use spx_common::events::{PresentationRecord, ResponseRecord};
use spx_common::{Section, SessionRecord};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub trait RecordSink: Send + Sync {
    fn emit(&self, record: SessionRecord) -> Result<()>;
}

/// Forwards records to an async consumer
///
/// Unbounded so the blocking scheduler thread never waits on the consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionRecord>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecordSink for ChannelSink {
    fn emit(&self, record: SessionRecord) -> Result<()> {
        self.tx
            .send(record)
            .map_err(|_| Error::Channel("record consumer has gone away".to_string()))
    }
}

/// Keeps every record; used by dry runs and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<SessionRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn presentations(&self) -> Vec<PresentationRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                SessionRecord::Presentation(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn responses(&self) -> Vec<ResponseRecord> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                SessionRecord::Response(resp) => Some(resp),
                _ => None,
            })
            .collect()
    }

    /// Sections in the order they were entered
    pub fn entered_sections(&self) -> Vec<Section> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                SessionRecord::SectionEntered { section, .. } => Some(section),
                _ => None,
            })
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: SessionRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| Error::Internal("record store poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}
