//! Lifecycle notifications emitted by the [`CommandManager`](crate::CommandManager).
//!
//! Events are facts: they describe a transition that already happened and
//! carry snapshots, never references into the history store.
//!
//! | Event | Payload |
//! |---|---|
//! | `command:executed` | committed or merged entry, undo stack snapshot |
//! | `command:undone` | undone entry, undo stack snapshot |
//! | `command:redone` | redone entry, undo stack snapshot |
//! | `history:cleared` | nothing |
//! | `state:changed` | `can_undo`, `can_redo` |
//!
//! Snapshots list the undo stack most recent first.

use serde::{Deserialize, Serialize};

use crate::entry::EntryInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum HistoryEvent {
    #[serde(rename = "command:executed")]
    CommandExecuted {
        #[serde(rename = "command")]
        entry: EntryInfo,
        history: Vec<EntryInfo>,
        /// True when the command was folded into the previous entry.
        merged: bool,
    },

    #[serde(rename = "command:undone")]
    CommandUndone {
        #[serde(rename = "command")]
        entry: EntryInfo,
        history: Vec<EntryInfo>,
    },

    #[serde(rename = "command:redone")]
    CommandRedone {
        #[serde(rename = "command")]
        entry: EntryInfo,
        history: Vec<EntryInfo>,
    },

    #[serde(rename = "history:cleared")]
    HistoryCleared,

    #[serde(rename = "state:changed")]
    StateChanged {
        #[serde(rename = "canUndo")]
        can_undo: bool,
        #[serde(rename = "canRedo")]
        can_redo: bool,
    },
}

impl HistoryEvent {
    /// Wire name of the event, e.g. `command:executed`.
    pub fn name(&self) -> &'static str {
        match self {
            HistoryEvent::CommandExecuted { .. } => "command:executed",
            HistoryEvent::CommandUndone { .. } => "command:undone",
            HistoryEvent::CommandRedone { .. } => "command:redone",
            HistoryEvent::HistoryCleared => "history:cleared",
            HistoryEvent::StateChanged { .. } => "state:changed",
        }
    }

    /// The entry this event is about, if any.
    pub fn entry(&self) -> Option<&EntryInfo> {
        match self {
            HistoryEvent::CommandExecuted { entry, .. }
            | HistoryEvent::CommandUndone { entry, .. }
            | HistoryEvent::CommandRedone { entry, .. } => Some(entry),
            HistoryEvent::HistoryCleared | HistoryEvent::StateChanged { .. } => None,
        }
    }

    /// JSON form for UI bridges: `{"event": "<name>", "payload": {..}}`.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "event": self.name() }))
    }
}
