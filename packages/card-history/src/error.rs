//! Structured error types for the command history engine.
//!
//! `HistoryError` provides pattern-matchable errors instead of generic `anyhow::Error`.
//! `FailureKind` is the discriminated reason a caller switches on to tell
//! "the engine is busy" apart from "something went wrong".
//!
//! # The Error Boundary Rule
//!
//! > **Commands speak `anyhow`, the engine speaks `HistoryError`.**
//!
//! - `anyhow` is internal transport (ergonomic for command implementations)
//! - `HistoryError` is the only error a [`CommandManager`](crate::CommandManager) returns
//!
//! "Nothing to undo" is not an error: `undo()`/`redo()` report it as `Ok(None)`.
//!
//! # Example
//!
//! ```ignore
//! use card_history::{FailureKind, HistoryError};
//!
//! match manager.undo().await {
//!     Ok(Some(entry)) => println!("undid {}", entry.description),
//!     Ok(None) => println!("nothing to undo"),
//!     Err(e) => match e.kind() {
//!         FailureKind::Busy => toolbar.flash_busy(),
//!         FailureKind::NotFound => unreachable!(),
//!         FailureKind::Command => toast.error(e.to_string()),
//!     },
//! }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::entry::EntryId;

// =============================================================================
// Operation
// =============================================================================

/// The mutating operation an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `CommandManager::execute`.
    Execute,
    /// `CommandManager::undo` or an undo step of a traversal.
    Undo,
    /// `CommandManager::redo` or a redo step of a traversal.
    Redo,
    /// `CommandManager::go_to_history`.
    GoTo,
    /// `CommandManager::clear`.
    Clear,
    /// `CommandManager::set_max_history`.
    Resize,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Execute => write!(f, "execute"),
            Operation::Undo => write!(f, "undo"),
            Operation::Redo => write!(f, "redo"),
            Operation::GoTo => write!(f, "go_to_history"),
            Operation::Clear => write!(f, "clear"),
            Operation::Resize => write!(f, "set_max_history"),
        }
    }
}

// =============================================================================
// Failure Kind
// =============================================================================

/// Discriminated failure reason, safe to switch on in UI code.
///
/// The fourth reason, "empty", is not an error at all: it is the `Ok(None)`
/// result of `undo()`/`redo()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Another mutation is in flight. Nothing changed.
    Busy,
    /// `go_to_history` was given an id that is in neither stack. Nothing changed.
    NotFound,
    /// A command's own execute/undo/redo failed, panicked or timed out.
    Command,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Busy => write!(f, "busy"),
            FailureKind::NotFound => write!(f, "not_found"),
            FailureKind::Command => write!(f, "command_error"),
        }
    }
}

// =============================================================================
// History Error
// =============================================================================

/// Structured error type for history operations.
///
/// Each variant includes context about what went wrong.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A mutation was attempted while another one is in flight.
    ///
    /// Also returned for re-entrant calls made from inside a command.
    #[error("cannot {operation}: another history operation is in flight")]
    Busy {
        /// The rejected operation.
        operation: Operation,
    },

    /// The requested history entry is in neither stack.
    #[error("history entry {id} not found")]
    NotFound {
        /// The id that was looked up.
        id: EntryId,
    },

    /// The command returned an error.
    #[error("{operation} of \"{description}\" failed: {source}")]
    CommandFailed {
        /// Which command call failed.
        operation: Operation,
        /// Description of the command at the time of the call.
        description: String,
        /// The command's own error.
        #[source]
        source: anyhow::Error,
    },

    /// The command panicked.
    #[error("{operation} of \"{description}\" panicked: {message}")]
    CommandPanicked {
        /// Which command call panicked.
        operation: Operation,
        /// Description of the command at the time of the call.
        description: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// The command did not settle within the configured timeout.
    #[error("{operation} of \"{description}\" timed out after {duration:?}")]
    Timeout {
        /// Which command call was abandoned.
        operation: Operation,
        /// Description of the command at the time of the call.
        description: String,
        /// The configured limit.
        duration: Duration,
    },

    /// A `go_to_history` traversal stopped part way.
    ///
    /// Completed steps are not rolled back.
    #[error("history traversal stopped after {completed} of {planned} steps: {source}")]
    Traversal {
        /// Steps that were applied before the failure.
        completed: usize,
        /// Steps the traversal needed in total.
        planned: usize,
        /// The step failure.
        #[source]
        source: Box<HistoryError>,
    },
}

impl HistoryError {
    /// The discriminated reason for this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            HistoryError::Busy { .. } => FailureKind::Busy,
            HistoryError::NotFound { .. } => FailureKind::NotFound,
            HistoryError::CommandFailed { .. }
            | HistoryError::CommandPanicked { .. }
            | HistoryError::Timeout { .. } => FailureKind::Command,
            HistoryError::Traversal { source, .. } => source.kind(),
        }
    }

    /// Returns true if this is a busy rejection.
    pub fn is_busy(&self) -> bool {
        matches!(self, HistoryError::Busy { .. })
    }

    /// Number of traversal steps applied before the failure.
    ///
    /// Zero for everything except [`HistoryError::Traversal`].
    pub fn completed_steps(&self) -> usize {
        match self {
            HistoryError::Traversal { completed, .. } => *completed,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_display() {
        let err = HistoryError::Busy {
            operation: Operation::Undo,
        };
        assert!(err.to_string().contains("cannot undo"));
        assert!(err.to_string().contains("in flight"));
        assert!(err.is_busy());
        assert_eq!(err.kind(), FailureKind::Busy);
    }

    #[test]
    fn test_not_found_display() {
        let id = EntryId::new();
        let err = HistoryError::NotFound { id };
        assert!(err.to_string().contains(&id.to_string()));
        assert_eq!(err.kind(), FailureKind::NotFound);
    }

    #[test]
    fn test_command_failure_keeps_source() {
        let err = HistoryError::CommandFailed {
            operation: Operation::Execute,
            description: "Add card".into(),
            source: anyhow::anyhow!("disk full"),
        };
        let display = err.to_string();
        assert!(display.contains("execute"));
        assert!(display.contains("Add card"));
        assert!(display.contains("disk full"));
        assert_eq!(err.kind(), FailureKind::Command);

        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "disk full");
    }

    #[test]
    fn test_timeout_display() {
        let err = HistoryError::Timeout {
            operation: Operation::Redo,
            description: "Move card".into(),
            duration: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("30"));
        assert_eq!(err.kind(), FailureKind::Command);
    }

    #[test]
    fn test_traversal_reports_progress_and_inner_kind() {
        let err = HistoryError::Traversal {
            completed: 2,
            planned: 5,
            source: Box::new(HistoryError::CommandPanicked {
                operation: Operation::Undo,
                description: "Rename".into(),
                message: "boom".into(),
            }),
        };
        assert_eq!(err.completed_steps(), 2);
        assert_eq!(err.kind(), FailureKind::Command);
        assert!(err.to_string().contains("2 of 5"));
    }

    #[test]
    fn test_error_is_pattern_matchable() {
        let err = HistoryError::Busy {
            operation: Operation::Clear,
        };

        match &err {
            HistoryError::Busy { operation } => assert_eq!(*operation, Operation::Clear),
            _ => panic!("Expected Busy"),
        }
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::Busy.to_string(), "busy");
        assert_eq!(FailureKind::NotFound.to_string(), "not_found");
        assert_eq!(FailureKind::Command.to_string(), "command_error");
    }
}
