//! Grouping several commands into one history step.
//!
//! A [`CommandBatch`] is itself a [`Command`]: it occupies one history entry
//! and one undo reverts all of its children. Children run in order on
//! execute/redo and in reverse order on undo.
//!
//! Batches do not pretend to be atomic, but they do not leave half of
//! themselves applied either. When a child fails, the children already
//! applied in that call are reverted in reverse order before the error is
//! returned. Revert failures are logged and reported in the error chain.
//!
//! # Example
//!
//! ```ignore
//! let batch = CommandBatch::new("Paste 3 cards")
//!     .with(AddCard::new(deck.clone(), "a"))
//!     .with(AddCard::new(deck.clone(), "b"))
//!     .with(AddCard::new(deck.clone(), "c"));
//!
//! manager.execute(Box::new(batch)).await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::command::Command;

/// Which direction a pass over the children runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Execute,
    Redo,
    Undo,
}

/// Several commands recorded as a single history entry.
#[derive(Debug)]
pub struct CommandBatch {
    description: String,
    commands: Vec<Box<dyn Command>>,
}

impl CommandBatch {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            commands: Vec::new(),
        }
    }

    /// Append a child command.
    pub fn with(mut self, command: impl Command) -> Self {
        self.commands.push(Box::new(command));
        self
    }

    /// Append an already boxed child command.
    pub fn push(&mut self, command: Box<dyn Command>) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    async fn run(&mut self, pass: Pass) -> Result<()> {
        let order: Vec<usize> = match pass {
            Pass::Execute | Pass::Redo => (0..self.commands.len()).collect(),
            Pass::Undo => (0..self.commands.len()).rev().collect(),
        };

        for (done, &index) in order.iter().enumerate() {
            let command = &mut self.commands[index];
            let result = match pass {
                Pass::Execute => command.execute().await,
                Pass::Redo => command.redo().await,
                Pass::Undo => command.undo().await,
            };

            if let Err(error) = result {
                let failed = command.description();
                self.revert(pass, &order[..done]).await;
                return Err(error).with_context(|| {
                    format!(
                        "\"{}\" failed at step {} of {} (\"{}\")",
                        self.description,
                        done + 1,
                        order.len(),
                        failed
                    )
                });
            }
        }
        Ok(())
    }

    /// Best-effort reversal of the children applied so far, newest first.
    async fn revert(&mut self, pass: Pass, applied: &[usize]) {
        for &index in applied.iter().rev() {
            let command = &mut self.commands[index];
            let result = match pass {
                Pass::Execute | Pass::Redo => command.undo().await,
                Pass::Undo => command.redo().await,
            };
            if let Err(error) = result {
                warn!(
                    batch = %self.description,
                    command = %command.description(),
                    error = ?error,
                    "failed to revert batch step"
                );
            }
        }
    }
}

#[async_trait]
impl Command for CommandBatch {
    async fn execute(&mut self) -> Result<()> {
        self.run(Pass::Execute).await
    }

    async fn undo(&mut self) -> Result<()> {
        self.run(Pass::Undo).await
    }

    async fn redo(&mut self) -> Result<()> {
        self.run(Pass::Redo).await
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
