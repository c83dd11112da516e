//! The two history stacks, stored as one arena.
//!
//! ```text
//!  entries:  [ e0  e1  e2  e3 | e4  e5 ]
//!                             ^ cursor
//!  undo stack = entries[..cursor]   oldest first, e3 is current
//!  redo stack = entries[cursor..]   e4 is the next to redo
//! ```
//!
//! Moving an entry between stacks is a cursor move plus, while a command is
//! in flight, a remove/insert at the cursor. Nothing else in the arena
//! shifts, and no entry is ever in both stacks.
//!
//! Committing is split in three so no command code runs under the lock:
//! [`HistoryStore::take_merge_candidate`], then [`stage`], then
//! [`HistoryStore::commit`].

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::time::Duration;

use tokio::time::Instant;

use crate::command::Command;
use crate::entry::{EntryId, EntryInfo, HistoryEntry};

/// Where an entry sits relative to the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// In the undo stack, `depth` entries below the top (top is 0).
    Undo { depth: usize },
    /// In the redo stack, `index` entries after the next-to-redo (next is 0).
    Redo { index: usize },
}

/// Result of committing a freshly executed command.
#[derive(Debug)]
pub struct Commit {
    pub entry: EntryInfo,
    pub merged: bool,
    pub discarded_redo: usize,
    pub evicted: usize,
}

/// A freshly executed command, ready to be recorded.
#[derive(Debug)]
pub enum Staged {
    /// Folded into the merge candidate.
    Absorbed(EntryInfo),
    /// Needs an entry of its own.
    Fresh(HistoryEntry),
}

/// Fold `command` into `candidate` when its command consents, otherwise wrap
/// it in a new entry.
///
/// Runs the command's merge hooks and `description`, so call it without the
/// store lock held.
pub fn stage(candidate: Option<&mut HistoryEntry>, command: Box<dyn Command>, at: Instant) -> Staged {
    match candidate {
        Some(top) if top.consents(command.as_ref()) => {
            top.absorb(command, at);
            Staged::Absorbed(top.info())
        }
        _ => Staged::Fresh(HistoryEntry::new(command, at)),
    }
}

#[derive(Debug)]
pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    max_size: NonZeroUsize,
}

impl HistoryStore {
    pub fn new(max_size: NonZeroUsize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            max_size,
        }
    }

    pub fn max_size(&self) -> NonZeroUsize {
        self.max_size
    }

    pub fn undo_len(&self) -> usize {
        self.cursor
    }

    pub fn redo_len(&self) -> usize {
        self.entries.len() - self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Check out the top entry if a command committed at `at` may merge
    /// into it.
    ///
    /// Only the cached capability and the window are checked here. The
    /// command's own consent is asked by [`stage`], without the lock.
    pub fn take_merge_candidate(&mut self, at: Instant, window: Duration) -> Option<HistoryEntry> {
        if self.top().is_some_and(|top| top.within_window(at, window)) {
            self.checkout_undo()
        } else {
            None
        }
    }

    /// Record a staged command.
    ///
    /// `candidate` is the entry returned by
    /// [`HistoryStore::take_merge_candidate`], absorbed or not; it goes back
    /// on top first. The redo stack is discarded and the size limit enforced.
    pub fn commit(&mut self, candidate: Option<HistoryEntry>, staged: Staged) -> Commit {
        let discarded_redo = self.redo_len();
        self.entries.truncate(self.cursor);

        if let Some(candidate) = candidate {
            self.entries.push_back(candidate);
            self.cursor += 1;
        }

        let (entry, merged) = match staged {
            Staged::Absorbed(info) => (info, true),
            Staged::Fresh(entry) => {
                let info = entry.info();
                self.entries.push_back(entry);
                self.cursor += 1;
                (info, false)
            }
        };

        // The limit is at least one, so the committed entry always survives.
        let evicted = self.evict_overflow();

        Commit {
            entry,
            merged,
            discarded_redo,
            evicted,
        }
    }

    /// Remove the top of the undo stack so its command can run.
    ///
    /// Hand it back with [`HistoryStore::return_to_redo`] on success or
    /// [`HistoryStore::return_to_undo`] on failure.
    pub fn checkout_undo(&mut self) -> Option<HistoryEntry> {
        let index = self.cursor.checked_sub(1)?;
        let entry = self.entries.remove(index)?;
        self.cursor = index;
        Some(entry)
    }

    /// Remove the next-to-redo entry so its command can run.
    ///
    /// Hand it back with [`HistoryStore::return_to_undo`] on success or
    /// [`HistoryStore::return_to_redo`] on failure.
    pub fn checkout_redo(&mut self) -> Option<HistoryEntry> {
        self.entries.remove(self.cursor)
    }

    /// Place an entry on top of the undo stack.
    ///
    /// Returns the number of evicted entries.
    pub fn return_to_undo(&mut self, entry: HistoryEntry) -> usize {
        self.entries.insert(self.cursor, entry);
        self.cursor += 1;
        self.evict_overflow()
    }

    /// Place an entry as the next to redo.
    pub fn return_to_redo(&mut self, entry: HistoryEntry) {
        self.entries.insert(self.cursor, entry);
    }

    pub fn locate(&self, id: EntryId) -> Option<Position> {
        let index = self.entries.iter().position(|e| e.id() == id)?;
        Some(if index < self.cursor {
            Position::Undo {
                depth: self.cursor - 1 - index,
            }
        } else {
            Position::Redo {
                index: index - self.cursor,
            }
        })
    }

    /// Drop both stacks. Returns how many entries were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.cursor = 0;
        dropped
    }

    /// Change the limit, evicting the oldest undo entries if needed.
    pub fn set_max_size(&mut self, max_size: NonZeroUsize) -> usize {
        self.max_size = max_size;
        self.evict_overflow()
    }

    pub fn top(&self) -> Option<&HistoryEntry> {
        self.cursor.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn next_redo(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }

    /// The undo stack, most recent first, at most `limit` entries.
    pub fn undo_snapshot(&self, limit: Option<usize>) -> Vec<EntryInfo> {
        self.entries
            .range(..self.cursor)
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(HistoryEntry::info)
            .collect()
    }

    /// The redo stack, next to redo first.
    pub fn redo_snapshot(&self) -> Vec<EntryInfo> {
        self.entries
            .range(self.cursor..)
            .map(HistoryEntry::info)
            .collect()
    }

    fn evict_overflow(&mut self) -> usize {
        let mut evicted = 0;
        while self.cursor > self.max_size.get() {
            self.entries.pop_front();
            self.cursor -= 1;
            evicted += 1;
        }
        evicted
    }
}

#[cfg(test)]
mod tests;
