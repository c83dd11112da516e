//! History entries and their observer-facing snapshots.
//!
//! A [`HistoryEntry`] owns exactly one committed command. It lives in exactly
//! one of the two stacks of the [`HistoryStore`](crate::store::HistoryStore)
//! and ownership moves with it between them.
//!
//! [`EntryInfo`] is what leaves the engine: a cheap, serializable copy of an
//! entry's metadata for history panels and event payloads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::command::Command;

/// Stable identifier of a history entry.
///
/// Survives merges and moves between the undo and redo stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new random entry id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value.
    pub fn into_inner(self) -> Uuid {
        self.0
    }

    /// Get a reference to the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EntryId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntryId> for Uuid {
    fn from(id: EntryId) -> Uuid {
        id.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committed command plus its metadata.
///
/// Immutable except through [`HistoryEntry::absorb`], which the store only
/// allows on the entry at the top of the undo stack.
pub struct HistoryEntry {
    id: EntryId,
    description: String,
    /// Monotonic commit time, used for the merge window.
    committed_at: Instant,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    merge_count: usize,
    /// Cached `Command::supports_merge`.
    mergeable: bool,
    command: Box<dyn Command>,
}

impl HistoryEntry {
    /// Wrap a command that has just executed successfully.
    pub fn new(command: Box<dyn Command>, committed_at: Instant) -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            description: command.description(),
            committed_at,
            created_at: now,
            updated_at: now,
            merge_count: 1,
            mergeable: command.supports_merge(),
            command,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    #[cfg(test)]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[cfg(test)]
    pub fn committed_at(&self) -> Instant {
        self.committed_at
    }

    #[cfg(test)]
    pub fn merge_count(&self) -> usize {
        self.merge_count
    }

    /// Whether a command committed at `at` is close enough to merge.
    ///
    /// Checks the cached capability and the window only; no command code runs.
    pub fn within_window(&self, at: Instant, window: std::time::Duration) -> bool {
        self.mergeable && at.saturating_duration_since(self.committed_at) <= window
    }

    /// Ask this entry's command whether it takes `incoming`.
    pub fn consents(&self, incoming: &dyn Command) -> bool {
        self.command.can_merge_with(incoming)
    }

    /// Fold `incoming` into this entry.
    ///
    /// Extends the merge window to `at` and refreshes the description.
    pub fn absorb(&mut self, incoming: Box<dyn Command>, at: Instant) {
        self.command.merge_with(incoming);
        self.description = self.command.description();
        self.committed_at = at;
        self.updated_at = Utc::now();
        self.merge_count += 1;
    }

    pub fn command_mut(&mut self) -> &mut dyn Command {
        self.command.as_mut()
    }

    /// Snapshot the metadata for observers.
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            id: self.id,
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            merge_count: self.merge_count,
        }
    }
}

impl fmt::Debug for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryEntry")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("merge_count", &self.merge_count)
            .field("mergeable", &self.mergeable)
            .finish_non_exhaustive()
    }
}

/// Serializable snapshot of a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub id: EntryId,
    pub description: String,
    /// When the first command of this entry was committed.
    pub created_at: DateTime<Utc>,
    /// When the entry last absorbed a merge.
    pub updated_at: DateTime<Utc>,
    /// Number of commands folded into this entry, starting at 1.
    pub merge_count: usize,
}
