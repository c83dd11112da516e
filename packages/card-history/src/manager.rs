//! Command Manager - orchestration of execute, undo, redo and time travel.
//!
//! ```text
//! execute(cmd) ─► cmd.execute() ─► commit (merge or push, drop redo, evict)
//!                                        │
//! undo() ──► checkout top ─► cmd.undo() ─┼─► redo stack   (restored if dropped)
//! redo() ──► checkout next ─► cmd.redo() ┼─► undo stack   (restored if dropped)
//!                                        │
//!                                        └─► HistoryBus: command:* + state:changed
//! ```
//!
//! # Single Flight
//!
//! At most one mutating operation runs at a time. The `executing` flag is
//! flipped with a single compare-and-swap before the first suspension point,
//! so two callers can never both pass the check. A second caller gets
//! [`HistoryError::Busy`] immediately; nothing is queued. This includes
//! re-entrant calls made by a command from inside its own execute/undo/redo.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use card_history::{CommandManager, HistoryConfig};
//!
//! let manager = Arc::new(CommandManager::new(HistoryConfig::from_env()?));
//!
//! manager.execute(Box::new(AddCard::new(deck.clone(), "x"))).await?;
//! manager.undo().await?;
//!
//! for entry in manager.history(Some(20)) {
//!     println!("{}", entry.description);
//! }
//! ```

use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bus::HistoryBus;
use crate::command::Command;
use crate::config::HistoryConfig;
use crate::entry::{EntryId, EntryInfo, HistoryEntry};
use crate::error::{HistoryError, Operation};
use crate::event::HistoryEvent;
use crate::store::{stage, HistoryStore, Position};

/// Which way a `go_to_history` traversal moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The target was already current.
    Stay,
    Undo,
    Redo,
}

/// A completed `go_to_history` traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traversal {
    pub direction: Direction,
    /// Number of undo or redo steps applied.
    pub steps: usize,
}

/// The command call being made.
#[derive(Debug, Clone, Copy)]
enum Call {
    Execute,
    Undo,
    Redo,
}

impl Call {
    fn operation(self) -> Operation {
        match self {
            Call::Execute => Operation::Execute,
            Call::Undo => Operation::Undo,
            Call::Redo => Operation::Redo,
        }
    }
}

// =============================================================================
// Executing Guard
// =============================================================================

/// RAII guard for the single-flight flag.
///
/// Clears the flag on drop, so it is released on success, failure, panic and
/// when the caller drops the operation's future.
struct ExecutingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// =============================================================================
// Checked-Out Entry
// =============================================================================

/// Which stack a checked-out entry came from.
#[derive(Debug, Clone, Copy)]
enum Stack {
    Undo,
    Redo,
}

/// RAII guard for an entry taken out of the store while command code runs.
///
/// Puts the entry back on the stack it came from on drop, unless
/// [`CheckedOut::release`] handed it on. A call that fails, panics, times
/// out or is cancelled by dropping its future leaves the entry where it was.
///
/// Must not be dropped while the store lock is held.
struct CheckedOut<'a> {
    store: &'a Mutex<HistoryStore>,
    entry: Option<HistoryEntry>,
    home: Stack,
}

impl<'a> CheckedOut<'a> {
    fn new(store: &'a Mutex<HistoryStore>, entry: Option<HistoryEntry>, home: Stack) -> Self {
        Self { store, entry, home }
    }

    fn entry_mut(&mut self) -> Option<&mut HistoryEntry> {
        self.entry.as_mut()
    }

    /// Take the entry for placing elsewhere; the guard no longer returns it.
    fn release(&mut self) -> Option<HistoryEntry> {
        self.entry.take()
    }
}

impl Drop for CheckedOut<'_> {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let mut store = lock_store(self.store);
        match self.home {
            Stack::Undo => {
                store.return_to_undo(entry);
            }
            Stack::Redo => store.return_to_redo(entry),
        }
    }
}

// =============================================================================
// Command Manager
// =============================================================================

/// Owns the history and serializes every mutation of it.
///
/// Cheap queries (`can_undo`, `history`, ...) never wait and are answered
/// even while a mutation is in flight. Share it as `Arc<CommandManager>`.
pub struct CommandManager {
    config: HistoryConfig,
    store: Mutex<HistoryStore>,
    executing: AtomicBool,
    bus: HistoryBus,
}

impl CommandManager {
    /// Create a manager with its own event bus.
    pub fn new(config: HistoryConfig) -> Self {
        CommandManagerBuilder::new().with_config(config).build()
    }

    pub fn builder() -> CommandManagerBuilder {
        CommandManagerBuilder::new()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Run `command` and record it.
    ///
    /// On success the command is merged into the current entry when eligible
    /// (see [`Command::supports_merge`]) or pushed as a new one, the redo
    /// stack is discarded and the oldest entries beyond `max_history` are
    /// evicted. Returns the resulting entry.
    ///
    /// On failure neither stack changes and the command is dropped. That
    /// includes a panicking merge hook and a caller dropping this future;
    /// whatever the command already applied is not recorded.
    pub async fn execute(&self, mut command: Box<dyn Command>) -> Result<EntryInfo, HistoryError> {
        let _guard = self.begin(Operation::Execute)?;

        self.invoke(Call::Execute, command.as_mut()).await?;
        let description = describe(command.as_ref());

        // Merge hooks run without the store lock, the candidate checked out.
        let committed_at = Instant::now();
        let candidate = self
            .store()
            .take_merge_candidate(committed_at, self.config.merge_window);
        let mut candidate = CheckedOut::new(&self.store, candidate, Stack::Undo);

        let staged = std::panic::catch_unwind(AssertUnwindSafe(|| {
            stage(candidate.entry_mut(), command, committed_at)
        }));
        let staged = match staged {
            Ok(staged) => staged,
            Err(panic_info) => {
                let message = extract_panic_message(&panic_info);
                error!(operation = %Operation::Execute, %description, panic = %message, "merge hook panicked");
                return Err(HistoryError::CommandPanicked {
                    operation: Operation::Execute,
                    description,
                    message,
                });
            }
        };

        let (commit, history, can_undo, can_redo, redo_len) = {
            let mut store = self.store();
            let commit = store.commit(candidate.release(), staged);
            (
                commit,
                store.undo_snapshot(None),
                store.can_undo(),
                store.can_redo(),
                store.redo_len(),
            )
        };

        if self.config.debug {
            info!(
                transition = "executed",
                entry_id = %commit.entry.id,
                description = %commit.entry.description,
                merged = commit.merged,
                discarded_redo = commit.discarded_redo,
                evicted = commit.evicted,
                undo_len = history.len(),
                redo_len,
                "history transition"
            );
        }

        self.bus.emit(HistoryEvent::CommandExecuted {
            entry: commit.entry.clone(),
            history,
            merged: commit.merged,
        });
        self.emit_state(can_undo, can_redo);

        Ok(commit.entry)
    }

    /// Undo the current entry.
    ///
    /// Returns `Ok(None)` without emitting anything when there is nothing to
    /// undo. If the command's undo fails, or this future is dropped before it
    /// settles, the entry stays where it was.
    pub async fn undo(&self) -> Result<Option<EntryInfo>, HistoryError> {
        let _guard = self.begin(Operation::Undo)?;
        self.undo_step().await
    }

    /// Redo the next undone entry.
    ///
    /// Returns `Ok(None)` without emitting anything when there is nothing to
    /// redo. If the command's redo fails, or this future is dropped before it
    /// settles, the entry stays where it was.
    pub async fn redo(&self) -> Result<Option<EntryInfo>, HistoryError> {
        let _guard = self.begin(Operation::Redo)?;
        self.redo_step().await
    }

    /// Move the current position to the entry `id`.
    ///
    /// An entry in the undo stack at depth `d` (the current entry is depth 0)
    /// takes `d` undos and stays applied. An entry at position `r` of the redo
    /// stack (next-to-redo is 0) takes `r + 1` redos.
    ///
    /// The whole traversal holds the single-flight guard. If a step fails
    /// the traversal stops there; completed steps are kept and reported in
    /// [`HistoryError::Traversal`].
    pub async fn go_to_history(&self, id: EntryId) -> Result<Traversal, HistoryError> {
        let _guard = self.begin(Operation::GoTo)?;

        let position = self.store().locate(id);
        let (direction, planned) = match position {
            None => return Err(HistoryError::NotFound { id }),
            Some(Position::Undo { depth: 0 }) => (Direction::Stay, 0),
            Some(Position::Undo { depth }) => (Direction::Undo, depth),
            Some(Position::Redo { index }) => (Direction::Redo, index + 1),
        };

        let mut completed = 0;
        while completed < planned {
            let step = match direction {
                Direction::Undo => self.undo_step().await,
                Direction::Redo => self.redo_step().await,
                Direction::Stay => break,
            };
            match step {
                Ok(Some(_)) => completed += 1,
                Ok(None) => break,
                Err(source) => {
                    warn!(target_id = %id, completed, planned, "history traversal stopped");
                    return Err(HistoryError::Traversal {
                        completed,
                        planned,
                        source: Box::new(source),
                    });
                }
            }
        }

        if self.config.debug {
            info!(transition = "traversed", target_id = %id, ?direction, steps = completed, "history transition");
        }

        Ok(Traversal {
            direction,
            steps: completed,
        })
    }

    /// Drop both stacks.
    pub fn clear(&self) -> Result<(), HistoryError> {
        let _guard = self.begin(Operation::Clear)?;

        let dropped = self.store().clear();
        if self.config.debug {
            info!(transition = "cleared", dropped, "history transition");
        }

        self.bus.emit(HistoryEvent::HistoryCleared);
        self.emit_state(false, false);
        Ok(())
    }

    /// Change the undo-stack limit at runtime.
    ///
    /// Evicts the oldest undo entries right away when the new limit is
    /// smaller and returns how many were dropped.
    pub fn set_max_history(&self, max_history: NonZeroUsize) -> Result<usize, HistoryError> {
        let _guard = self.begin(Operation::Resize)?;

        let evicted = self.store().set_max_size(max_history);
        if self.config.debug {
            info!(transition = "resized", max_history = max_history.get(), evicted, "history transition");
        }
        Ok(evicted)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn can_undo(&self) -> bool {
        self.store().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.store().can_redo()
    }

    /// Whether a mutation is in flight.
    pub fn is_busy(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// The undo stack, most recent first, truncated to `limit`.
    pub fn history(&self, limit: Option<usize>) -> Vec<EntryInfo> {
        self.store().undo_snapshot(limit)
    }

    /// The redo stack, next to redo first.
    pub fn redo_history(&self) -> Vec<EntryInfo> {
        self.store().redo_snapshot()
    }

    /// The entry the next `undo` would revert.
    pub fn peek_undo(&self) -> Option<EntryInfo> {
        self.store().top().map(|e| e.info())
    }

    /// The entry the next `redo` would re-apply.
    pub fn peek_redo(&self) -> Option<EntryInfo> {
        self.store().next_redo().map(|e| e.info())
    }

    pub fn undo_len(&self) -> usize {
        self.store().undo_len()
    }

    pub fn redo_len(&self) -> usize {
        self.store().redo_len()
    }

    pub fn max_history(&self) -> NonZeroUsize {
        self.store().max_size()
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Get access to the event bus.
    pub fn bus(&self) -> &HistoryBus {
        &self.bus
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.bus.subscribe()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn begin(&self, operation: Operation) -> Result<ExecutingGuard<'_>, HistoryError> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(%operation, "rejected, history operation in flight");
            return Err(HistoryError::Busy { operation });
        }
        Ok(ExecutingGuard {
            flag: &self.executing,
        })
    }

    fn store(&self) -> MutexGuard<'_, HistoryStore> {
        lock_store(&self.store)
    }

    /// Undo one entry. Caller holds the guard.
    async fn undo_step(&self) -> Result<Option<EntryInfo>, HistoryError> {
        let checked_out = self.store().checkout_undo();
        let mut checked_out = CheckedOut::new(&self.store, checked_out, Stack::Undo);
        let Some(entry) = checked_out.entry_mut() else {
            return Ok(None);
        };

        self.invoke(Call::Undo, entry.command_mut()).await?;

        let info = entry.info();
        let (history, can_undo, can_redo, redo_len) = {
            let mut store = self.store();
            if let Some(entry) = checked_out.release() {
                store.return_to_redo(entry);
            }
            (
                store.undo_snapshot(None),
                store.can_undo(),
                store.can_redo(),
                store.redo_len(),
            )
        };

        if self.config.debug {
            info!(
                transition = "undone",
                entry_id = %info.id,
                description = %info.description,
                undo_len = history.len(),
                redo_len,
                "history transition"
            );
        }

        self.bus.emit(HistoryEvent::CommandUndone {
            entry: info.clone(),
            history,
        });
        self.emit_state(can_undo, can_redo);
        Ok(Some(info))
    }

    /// Redo one entry. Caller holds the guard.
    async fn redo_step(&self) -> Result<Option<EntryInfo>, HistoryError> {
        let checked_out = self.store().checkout_redo();
        let mut checked_out = CheckedOut::new(&self.store, checked_out, Stack::Redo);
        let Some(entry) = checked_out.entry_mut() else {
            return Ok(None);
        };

        self.invoke(Call::Redo, entry.command_mut()).await?;

        let info = entry.info();
        let (history, can_undo, can_redo, redo_len, evicted) = {
            let mut store = self.store();
            let evicted = checked_out
                .release()
                .map_or(0, |entry| store.return_to_undo(entry));
            (
                store.undo_snapshot(None),
                store.can_undo(),
                store.can_redo(),
                store.redo_len(),
                evicted,
            )
        };

        if self.config.debug {
            info!(
                transition = "redone",
                entry_id = %info.id,
                description = %info.description,
                evicted,
                undo_len = history.len(),
                redo_len,
                "history transition"
            );
        }

        self.bus.emit(HistoryEvent::CommandRedone {
            entry: info.clone(),
            history,
        });
        self.emit_state(can_undo, can_redo);
        Ok(Some(info))
    }

    /// Run one command call, turning errors, panics and timeouts into
    /// [`HistoryError`]s.
    async fn invoke(&self, call: Call, command: &mut dyn Command) -> Result<(), HistoryError> {
        let operation = call.operation();
        let description = describe(command);

        let future = match call {
            Call::Execute => command.execute(),
            Call::Undo => command.undo(),
            Call::Redo => command.redo(),
        };
        // AssertUnwindSafe is required because the command is not UnwindSafe
        let future = AssertUnwindSafe(future).catch_unwind();

        let outcome = match self.config.command_timeout {
            Some(duration) => match tokio::time::timeout(duration, future).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(%operation, %description, ?duration, "command timed out");
                    return Err(HistoryError::Timeout {
                        operation,
                        description,
                        duration,
                    });
                }
            },
            None => future.await,
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => {
                warn!(%operation, %description, error = ?source, "command failed");
                Err(HistoryError::CommandFailed {
                    operation,
                    description,
                    source,
                })
            }
            Err(panic_info) => {
                let message = extract_panic_message(&panic_info);
                error!(%operation, %description, panic = %message, "command panicked");
                Err(HistoryError::CommandPanicked {
                    operation,
                    description,
                    message,
                })
            }
        }
    }

    fn emit_state(&self, can_undo: bool, can_redo: bool) {
        self.bus
            .emit(HistoryEvent::StateChanged { can_undo, can_redo });
    }
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::new(HistoryConfig::default())
    }
}

impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("undo_len", &self.undo_len())
            .field("redo_len", &self.redo_len())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

fn lock_store(store: &Mutex<HistoryStore>) -> MutexGuard<'_, HistoryStore> {
    match store.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("history store mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// The command's description, or a placeholder if producing it panics.
fn describe(command: &dyn Command) -> String {
    std::panic::catch_unwind(AssertUnwindSafe(|| command.description()))
        .unwrap_or_else(|_| "<unnamed command>".to_string())
}

/// Extract a human-readable message from a panic payload.
fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`CommandManager`].
///
/// ```ignore
/// let bus = HistoryBus::new();
/// let manager = CommandManager::builder()
///     .with_config(HistoryConfig::default().with_debug(true))
///     .with_bus(bus.clone())
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct CommandManagerBuilder {
    config: HistoryConfig,
    bus: Option<HistoryBus>,
}

impl CommandManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: HistoryConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing event bus instead of creating a new one.
    ///
    /// Useful when one bus feeds several panels or other managers.
    pub fn with_bus(mut self, bus: HistoryBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn build(self) -> CommandManager {
        let bus = self
            .bus
            .unwrap_or_else(|| HistoryBus::with_capacity(self.config.event_capacity));
        CommandManager {
            store: Mutex::new(HistoryStore::new(self.config.max_history)),
            executing: AtomicBool::new(false),
            config: self.config,
            bus,
        }
    }
}
