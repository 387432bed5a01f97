//! Execution history: append-only record log with a time-travel cursor.

use crate::DebugError;
use af_core::debug::ExecutionState;
use chrono::{DateTime, Utc};

/// Append-only sequence of [`ExecutionState`] records.
///
/// Entries are only ever removed all at once by [`ExecutionHistory::clear`],
/// so a time-travel index stays valid for the lifetime of a session.
#[derive(Debug, Clone, Default)]
pub struct ExecutionHistory {
    entries: Vec<ExecutionState>,
    cursor: Option<usize>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, state: ExecutionState) {
        self.entries.push(state);
    }

    /// Drop every entry and the time-travel cursor.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    pub fn entries(&self) -> &[ExecutionState] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&ExecutionState> {
        self.entries.last()
    }

    pub fn time_travel_index(&self) -> Option<usize> {
        self.cursor
    }

    /// Point the cursor at the first entry recorded at `timestamp`.
    /// Clears the cursor when no entry matches.
    pub fn time_travel(&mut self, timestamp: DateTime<Utc>) -> Option<usize> {
        self.cursor = self.entries.iter().position(|e| e.timestamp == timestamp);
        self.cursor
    }

    /// Point the cursor at `index`, leaving it unchanged if out of range.
    pub fn time_travel_to(&mut self, index: usize) -> Result<(), DebugError> {
        if index >= self.entries.len() {
            return Err(DebugError::InvalidIndex {
                index,
                len: self.entries.len(),
            });
        }
        self.cursor = Some(index);
        Ok(())
    }

    pub fn clear_time_travel(&mut self) {
        self.cursor = None;
    }

    /// The entry under the cursor, or the most recent entry.
    pub fn current(&self) -> Option<&ExecutionState> {
        match self.cursor {
            Some(i) => self.entries.get(i),
            None => self.entries.last(),
        }
    }
}
