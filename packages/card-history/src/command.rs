//! The command contract consumed by the history engine.
//!
//! A [`Command`] is a reversible unit of work supplied by calling code
//! (editing features, window operations, config updates). The engine never
//! inspects what a command does; it only sequences `execute`, `undo` and
//! `redo` and records the outcome.
//!
//! # Merging
//!
//! Merge support is an explicit capability. [`Command::supports_merge`] is
//! read once, when the command is committed, and cached on its history
//! entry. Only entries carrying the capability are ever asked
//! [`Command::can_merge_with`], and only then is [`Command::merge_with`]
//! called.
//!
//! # Example
//!
//! ```ignore
//! use card_history::{async_trait, Command};
//!
//! struct MoveCard {
//!     card: CardId,
//!     from: Point,
//!     to: Point,
//!     board: Board,
//! }
//!
//! #[async_trait]
//! impl Command for MoveCard {
//!     async fn execute(&mut self) -> anyhow::Result<()> {
//!         self.board.place(self.card, self.to).await
//!     }
//!
//!     async fn undo(&mut self) -> anyhow::Result<()> {
//!         self.board.place(self.card, self.from).await
//!     }
//!
//!     fn description(&self) -> String {
//!         format!("Move card {}", self.card)
//!     }
//!
//!     fn supports_merge(&self) -> bool {
//!         true
//!     }
//!
//!     fn can_merge_with(&self, other: &dyn Command) -> bool {
//!         other
//!             .as_any()
//!             .downcast_ref::<MoveCard>()
//!             .is_some_and(|next| next.card == self.card)
//!     }
//!
//!     fn merge_with(&mut self, other: Box<dyn Command>) {
//!         if let Ok(next) = other.into_any().downcast::<MoveCard>() {
//!             self.to = next.to;
//!         }
//!     }
//! }
//! ```

use std::any::Any;

use anyhow::Result;
use async_trait::async_trait;

/// Downcasting support for command trait objects.
///
/// Implemented automatically for every `Send + Sync + 'static` type, so
/// merge implementations can recover the concrete type of the other command.
///
/// Call it on `&dyn Command` or `Box<dyn Command>` (for `into_any`). Calling
/// `as_any` on a `Box<dyn Command>` resolves to the box itself; use
/// `boxed.as_ref().as_any()` there.
pub trait AsAny: Any + Send + Sync {
    /// Borrow as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Convert an owned box into `Box<dyn Any>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

/// A reversible unit of work.
///
/// All three operations may suspend and may fail. Side effects are entirely
/// the implementation's responsibility; the engine only records whether each
/// call succeeded.
///
/// A command must not call back into the [`CommandManager`](crate::CommandManager)
/// that is running it. Such calls are rejected as busy.
#[async_trait]
pub trait Command: AsAny + 'static {
    /// Apply the command for the first time.
    async fn execute(&mut self) -> Result<()>;

    /// Reverse the command's effect.
    async fn undo(&mut self) -> Result<()>;

    /// Re-apply the command after an undo.
    ///
    /// Defaults to [`Command::execute`].
    async fn redo(&mut self) -> Result<()> {
        self.execute().await
    }

    /// Stable, human-readable label shown in the history panel.
    fn description(&self) -> String;

    /// Whether this command can absorb later commands.
    ///
    /// Read once when the command is committed. Defaults to `false`.
    fn supports_merge(&self) -> bool {
        false
    }

    /// Whether `other` can be folded into this command.
    ///
    /// Only consulted when [`Command::supports_merge`] returned `true`.
    fn can_merge_with(&self, _other: &dyn Command) -> bool {
        false
    }

    /// Fold `other`'s effect into this command. `other` is dropped afterwards.
    ///
    /// Only called after [`Command::can_merge_with`] returned `true` for the
    /// same command.
    fn merge_with(&mut self, _other: Box<dyn Command>) {}
}

impl std::fmt::Debug for dyn Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("description", &self.description())
            .finish_non_exhaustive()
    }
}
