use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Entry, Role, ToolCall};

/// Append-only conversation log threaded through every step.
///
/// Every operation is pure: `append` and `merge_branches` return a new state
/// and leave the receiver untouched, so a step that fails half-way never
/// leaves a partially extended log behind.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationState {
    entries: Vec<Entry>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from already-validated entries.
    pub fn from_entries(entries: Vec<Entry>) -> Result<Self> {
        Self::new().append(entries)
    }

    /// Return a state holding the receiver's entries followed by `entries`.
    ///
    /// Fails with `MalformedEntry` if any given entry is invalid, in which
    /// case nothing is appended.
    pub fn append(&self, entries: Vec<Entry>) -> Result<Self> {
        for entry in &entries {
            entry.validate()?;
        }
        let mut next = self.entries.clone();
        next.extend(entries);
        Ok(Self { entries: next })
    }

    /// Concatenate the outputs of independent branches, in branch order.
    pub fn merge_branches(&self, branches: Vec<Vec<Entry>>) -> Result<Self> {
        self.append(branches.into_iter().flatten().collect())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn last_entry(&self) -> Option<&Entry> {
        self.entries.last()
    }

    /// True iff the last entry is an assistant entry requesting tools.
    pub fn has_pending_tool_calls(&self) -> bool {
        self.last_entry()
            .is_some_and(|e| e.role == Role::Assistant && e.has_tool_calls())
    }

    /// Tool calls of the last entry, or an empty slice when none are pending.
    pub fn pending_tool_calls(&self) -> &[ToolCall] {
        match self.last_entry() {
            Some(e) if e.role == Role::Assistant => &e.tool_calls,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tool result entries answering the given call id.
    pub fn results_for(&self, tool_call_id: &str) -> usize {
        self.entries
            .iter()
            .filter(|e| e.role == Role::Tool && e.tool_call_id.as_deref() == Some(tool_call_id))
            .count()
    }
}
