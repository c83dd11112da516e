//! History observers - react to lifecycle events without touching history.
//!
//! Observers are the UI side of the notification channel: a history panel
//! re-rendering its list, a toolbar toggling its undo/redo buttons, a bridge
//! forwarding events to a webview.
//!
//! | Role | Can mutate history? | Can block the manager? |
//! |---|---|---|
//! | `CommandManager` | yes | - |
//! | `HistoryObserver` | no | no |
//!
//! Observers run on their own task, after the transition is committed. An
//! observer that wants the authoritative state (for example after lagging)
//! reads it through the manager's queries.
//!
//! # Example
//!
//! ```ignore
//! use card_history::{spawn_observer, HistoryEvent, HistoryObserver, ObserverContext};
//!
//! struct Toolbar { undo: Button, redo: Button }
//!
//! #[async_trait]
//! impl HistoryObserver for Toolbar {
//!     async fn on_event(&self, event: &HistoryEvent, _ctx: &ObserverContext) -> Result<()> {
//!         if let HistoryEvent::StateChanged { can_undo, can_redo } = event {
//!             self.undo.set_enabled(*can_undo);
//!             self.redo.set_enabled(*can_redo);
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let handle = spawn_observer(manager.bus(), toolbar);
//! ```

use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::HistoryBus;
use crate::event::HistoryEvent;

/// Context provided to observers.
///
/// Intentionally minimal - observers observe, they don't act.
#[derive(Debug, Clone)]
pub struct ObserverContext {
    /// Position of this event in the observer's stream, starting at 1.
    /// Gaps are not filled in after a lag.
    pub sequence: u64,
    /// When the observer received the event.
    pub received_at: Instant,
}

/// Trait for observing history events.
#[async_trait]
pub trait HistoryObserver: Send + Sync + 'static {
    /// Called for every event received.
    ///
    /// Errors are logged but do not stop the observer.
    async fn on_event(&self, event: &HistoryEvent, ctx: &ObserverContext) -> Result<()>;

    /// Called when the observer fell behind and `missed` events were dropped.
    async fn on_lag(&self, _missed: u64) {}
}

/// Run `observer` on a new task until the bus closes.
///
/// Subscribes before returning, so every event emitted after this call is
/// delivered (subject to lag). The bus closes when the manager and every
/// clone of its bus are dropped.
pub fn spawn_observer<O: HistoryObserver>(bus: &HistoryBus, observer: O) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    let name = std::any::type_name::<O>();

    tokio::spawn(async move {
        let mut sequence = 0u64;
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    sequence += 1;
                    let ctx = ObserverContext {
                        sequence,
                        received_at: Instant::now(),
                    };
                    if let Err(e) = observer.on_event(&event, &ctx).await {
                        warn!(
                            observer = %name,
                            event = event.name(),
                            error = %e,
                            "history observer failed"
                        );
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(observer = %name, missed, "history observer lagged, missed events");
                    observer.on_lag(missed).await;
                }
                Err(RecvError::Closed) => {
                    info!(observer = %name, "history bus closed, observer stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::testing::{Journal, ScriptedCommand};
    use crate::{CommandManager, HistoryConfig};

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<(u64, &'static str)>>>,
        lagged: Arc<Mutex<u64>>,
    }

    #[async_trait]
    impl HistoryObserver for Recorder {
        async fn on_event(&self, event: &HistoryEvent, ctx: &ObserverContext) -> Result<()> {
            self.seen.lock().unwrap().push((ctx.sequence, event.name()));
            Ok(())
        }

        async fn on_lag(&self, missed: u64) {
            *self.lagged.lock().unwrap() += missed;
        }
    }

    struct Failing;

    #[async_trait]
    impl HistoryObserver for Failing {
        async fn on_event(&self, _event: &HistoryEvent, _ctx: &ObserverContext) -> Result<()> {
            anyhow::bail!("panel is gone")
        }
    }

    #[tokio::test]
    async fn test_observer_sees_transitions_until_bus_closes() {
        let journal = Journal::new();
        let manager = CommandManager::new(HistoryConfig::default());
        let recorder = Recorder::default();
        let handle = spawn_observer(manager.bus(), recorder.clone());

        manager
            .execute(Box::new(ScriptedCommand::new("Add x", &journal)))
            .await
            .unwrap();
        manager.undo().await.unwrap();
        drop(manager);

        handle.await.unwrap();
        assert_eq!(
            *recorder.seen.lock().unwrap(),
            vec![
                (1, "command:executed"),
                (2, "state:changed"),
                (3, "command:undone"),
                (4, "state:changed"),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_observer_keeps_running() {
        let bus = HistoryBus::new();
        let handle = spawn_observer(&bus, Failing);

        bus.emit(HistoryEvent::HistoryCleared);
        bus.emit(HistoryEvent::HistoryCleared);
        drop(bus);

        // Ends on close rather than on the first error.
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_observer_is_told_about_lag() {
        let bus = HistoryBus::with_capacity(2);
        let recorder = Recorder::default();
        let handle = spawn_observer(&bus, recorder.clone());

        // Nothing has been received yet on the current-thread runtime.
        for _ in 0..5 {
            bus.emit(HistoryEvent::HistoryCleared);
        }
        drop(bus);

        handle.await.unwrap();
        assert_eq!(*recorder.lagged.lock().unwrap(), 3);
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }
}
