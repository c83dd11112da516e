//! Broadcast channel for history lifecycle events.
//!
//! # Guarantees
//!
//! - **At-most-once delivery**: Slow receivers may miss events
//! - **In-memory only**: Events are not persisted
//! - **No replay**: Lagged receivers get `RecvError::Lagged`
//!
//! Observers that need the current state after a lag should re-read it from
//! the manager's queries rather than replaying events.

use tokio::sync::broadcast;

use crate::event::HistoryEvent;

/// Default channel capacity for the history bus.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast bus carrying [`HistoryEvent`]s to UI observers.
///
/// Cloning shares the channel.
///
/// # Example
///
/// ```ignore
/// let bus = HistoryBus::new();
/// let mut receiver = bus.subscribe();
///
/// let manager = CommandManager::builder().with_bus(bus.clone()).build();
/// manager.execute(Box::new(add_card)).await?;
///
/// let event = receiver.recv().await?;
/// assert_eq!(event.name(), "command:executed");
/// ```
#[derive(Clone)]
pub struct HistoryBus {
    sender: broadcast::Sender<HistoryEvent>,
}

impl HistoryBus {
    /// Create a new bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new bus with the specified capacity.
    ///
    /// The capacity determines how many events can be buffered before
    /// slow receivers start lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers (fire-and-forget).
    ///
    /// Returns the number of receivers that received the event.
    pub fn emit(&self, event: HistoryEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events on this bus.
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for HistoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HistoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
