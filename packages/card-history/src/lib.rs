//! # Card History
//!
//! Undo/redo for the card editor: every edit is a [`Command`] that knows how
//! to apply and revert itself, and a [`CommandManager`] keeps the two stacks.
//!
//! ## Core Concepts
//!
//! - [`Command`] = one reversible edit (add a card, move it, rename a deck)
//! - [`CommandManager`] = owns the undo and redo stacks, serializes mutations
//! - [`HistoryEvent`] = facts about transitions, broadcast on a [`HistoryBus`]
//! - [`HistoryObserver`] = UI side, re-renders from events
//!
//! ## Architecture
//!
//! ```text
//! Editor action
//!     │
//!     ▼ execute(Box<dyn Command>)
//! CommandManager ──► single-flight guard (Busy if taken)
//!     │
//!     ├─► command.execute() / undo() / redo()
//!     │
//!     ├─► HistoryStore  [ undo ... current | next ... redo ]
//!     │        merge window, eviction, redo discard
//!     │
//!     └─► HistoryBus ──► command:executed | command:undone | command:redone
//!                        history:cleared  | state:changed
//!                             │
//!                             ▼
//!                      HistoryObserver tasks (panels, toolbars)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **No entry is in both stacks** - moving an entry is a cursor move
//! 2. **A failed call keeps history intact** - failed, panicked, timed-out or
//!    cancelled calls leave every entry on the stack it was on; effects the
//!    command applied before failing are its own to revert
//! 3. **Executing discards redo** - new work forks away from undone work
//! 4. **Only the top entry merges** - and only within the merge window
//! 5. **One mutation at a time** - overlapping callers get `Busy`, not a queue
//!
//! ## Example
//!
//! ```ignore
//! use card_history::{async_trait, Command, CommandManager, HistoryConfig};
//!
//! struct Rename { deck: Deck, from: String, to: String }
//!
//! #[async_trait]
//! impl Command for Rename {
//!     async fn execute(&mut self) -> anyhow::Result<()> {
//!         self.deck.set_title(&self.to).await
//!     }
//!
//!     async fn undo(&mut self) -> anyhow::Result<()> {
//!         self.deck.set_title(&self.from).await
//!     }
//!
//!     fn description(&self) -> String {
//!         format!("Rename to {}", self.to)
//!     }
//! }
//!
//! let manager = CommandManager::new(HistoryConfig::from_env()?);
//! manager.execute(Box::new(rename)).await?;
//! manager.undo().await?;
//! ```

// Core modules
mod batch;
mod bus;
mod command;
mod config;
mod entry;
mod error;
mod event;
mod manager;
mod observer;
mod store;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;


// Re-export command types
pub use command::{AsAny, Command};
pub use batch::CommandBatch;

// Re-export manager types (primary entry point)
pub use manager::{CommandManager, CommandManagerBuilder, Direction, Traversal};

// Re-export history types
pub use entry::{EntryId, EntryInfo};

// Re-export configuration
pub use config::{HistoryConfig, DEFAULT_MAX_HISTORY, DEFAULT_MERGE_WINDOW};

// Re-export error types
pub use error::{FailureKind, HistoryError, Operation};

// Re-export event types
pub use bus::{HistoryBus, DEFAULT_CAPACITY};
pub use event::HistoryEvent;
pub use observer::{spawn_observer, HistoryObserver, ObserverContext};

// Re-export commonly used external types
pub use async_trait::async_trait;
