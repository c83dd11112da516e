//! Testing utilities for code that drives a [`CommandManager`](crate::CommandManager).
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! card-history = { path = "../card-history", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use card_history::testing::{Journal, ScriptedCommand, Step};
//!
//! let journal = Journal::new();
//! manager.execute(Box::new(ScriptedCommand::new("Add x", &journal))).await?;
//! manager
//!     .execute(Box::new(ScriptedCommand::new("Add y", &journal).failing(Step::Undo)))
//!     .await?;
//!
//! assert_eq!(journal.applied(), vec!["Add x", "Add y"]);
//! assert!(manager.undo().await.is_err());
//! ```
//!
//! A [`Journal`] models the document the commands edit: `applied()` is the
//! list of effects currently in place and `calls()` the raw call log.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::command::Command;

/// Which command call a scripted behaviour applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Execute,
    Undo,
    Redo,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Execute => write!(f, "execute"),
            Step::Undo => write!(f, "undo"),
            Step::Redo => write!(f, "redo"),
        }
    }
}

#[derive(Debug, Default)]
struct JournalState {
    applied: Vec<String>,
    calls: Vec<String>,
}

/// Shared record of what scripted commands did.
///
/// Cheap to clone; clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    state: Arc<Mutex<JournalState>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effects currently applied, oldest first.
    pub fn applied(&self) -> Vec<String> {
        self.lock().applied.clone()
    }

    /// Every call made, as `"<step> <label>"`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls of `step` made so far.
    pub fn count(&self, step: Step) -> usize {
        let prefix = format!("{step} ");
        self.lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    fn record(&self, step: Step, label: &str) {
        self.lock().calls.push(format!("{step} {label}"));
    }

    fn apply(&self, labels: &[String]) {
        self.lock().applied.extend(labels.iter().cloned());
    }

    fn revert(&self, labels: &[String]) {
        let mut state = self.lock();
        for label in labels.iter().rev() {
            if let Some(pos) = state.applied.iter().rposition(|a| a == label) {
                state.applied.remove(pos);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A command whose behaviour is scripted by the test.
///
/// Applying it appends its label (and the labels of every command merged
/// into it) to the journal; reverting removes them again.
#[derive(Debug, Clone)]
pub struct ScriptedCommand {
    labels: Vec<String>,
    journal: Journal,
    merge_key: Option<String>,
    failing: Vec<Step>,
    panicking: Vec<Step>,
    delay: Option<Duration>,
}

impl ScriptedCommand {
    pub fn new(label: impl Into<String>, journal: &Journal) -> Self {
        Self {
            labels: vec![label.into()],
            journal: journal.clone(),
            merge_key: None,
            failing: Vec::new(),
            panicking: Vec::new(),
            delay: None,
        }
    }

    /// Merge with other scripted commands carrying the same key.
    pub fn mergeable(mut self, key: impl Into<String>) -> Self {
        self.merge_key = Some(key.into());
        self
    }

    /// Fail every call of `step`, after recording it but before applying anything.
    pub fn failing(mut self, step: Step) -> Self {
        self.failing.push(step);
        self
    }

    /// Panic on every call of `step`.
    pub fn panicking(mut self, step: Step) -> Self {
        self.panicking.push(step);
        self
    }

    /// Sleep for `delay` at the start of every call.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn run(&mut self, step: Step) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let label = self.labels[0].clone();
        self.journal.record(step, &label);

        if self.panicking.contains(&step) {
            panic!("scripted panic in {step} of {label}");
        }
        if self.failing.contains(&step) {
            bail!("scripted failure in {step} of {label}");
        }

        match step {
            Step::Execute | Step::Redo => self.journal.apply(&self.labels),
            Step::Undo => self.journal.revert(&self.labels),
        }
        Ok(())
    }
}

#[async_trait]
impl Command for ScriptedCommand {
    async fn execute(&mut self) -> Result<()> {
        self.run(Step::Execute).await
    }

    async fn undo(&mut self) -> Result<()> {
        self.run(Step::Undo).await
    }

    async fn redo(&mut self) -> Result<()> {
        self.run(Step::Redo).await
    }

    fn description(&self) -> String {
        match self.labels.len() {
            1 => self.labels[0].clone(),
            n => format!("{} (x{n})", self.labels[0]),
        }
    }

    fn supports_merge(&self) -> bool {
        self.merge_key.is_some()
    }

    fn can_merge_with(&self, other: &dyn Command) -> bool {
        match other.as_any().downcast_ref::<ScriptedCommand>() {
            Some(other) => self.merge_key.is_some() && other.merge_key == self.merge_key,
            None => false,
        }
    }

    fn merge_with(&mut self, other: Box<dyn Command>) {
        if let Ok(other) = other.into_any().downcast::<ScriptedCommand>() {
            self.labels.extend(other.labels);
        }
    }
}
