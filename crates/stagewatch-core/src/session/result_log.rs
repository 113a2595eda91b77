//! Result log
//!
//! Decoded stage events in arrival order.

use serde::Serialize;
use serde_json::Value;

use crate::stages::StageName;

/// One decoded event received from the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageEvent {
    pub stage: StageName,
    /// Payload as sent by the backend, passed through without validation
    pub payload: Value,
}

impl StageEvent {
    pub fn new(stage: impl Into<StageName>, payload: Value) -> Self {
        Self {
            stage: stage.into(),
            payload,
        }
    }
}

/// Append-only log of stage events for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultLog {
    entries: Vec<StageEvent>,
}

impl ResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StageEvent) {
        self.entries.push(event);
    }

    pub fn entries(&self) -> &[StageEvent] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&StageEvent> {
        self.entries.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StageEvent> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a ResultLog {
    type Item = &'a StageEvent;
    type IntoIter = std::slice::Iter<'a, StageEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
