//! Card History Demo
//!
//! Drives a `CommandManager` over an in-memory deck and logs every history
//! event, the way the editor's history panel would receive them.
//!
//! Configuration comes from the environment (`HISTORY_MAX_ENTRIES`,
//! `HISTORY_MERGE_WINDOW_MS`, `HISTORY_DEBUG`, ...), see `HistoryConfig`.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use card_history::{
    async_trait, spawn_observer, Command, CommandBatch, CommandManager, HistoryConfig,
    HistoryEvent, HistoryObserver, ObserverContext,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// Deck
// =============================================================================

#[derive(Debug, Default)]
struct DeckState {
    title: String,
    cards: Vec<String>,
}

/// Shared in-memory deck the commands edit.
#[derive(Debug, Clone, Default)]
struct Deck {
    state: Arc<Mutex<DeckState>>,
}

impl Deck {
    fn new(title: &str) -> Self {
        let deck = Self::default();
        deck.lock().title = title.to_string();
        deck
    }

    fn lock(&self) -> MutexGuard<'_, DeckState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn summary(&self) -> String {
        let state = self.lock();
        format!("{} [{}]", state.title, state.cards.join(", "))
    }
}

// =============================================================================
// Commands
// =============================================================================

struct AddCard {
    deck: Deck,
    card: String,
}

#[async_trait]
impl Command for AddCard {
    async fn execute(&mut self) -> Result<()> {
        self.deck.lock().cards.push(self.card.clone());
        Ok(())
    }

    async fn undo(&mut self) -> Result<()> {
        let mut state = self.deck.lock();
        let pos = state
            .cards
            .iter()
            .rposition(|c| *c == self.card)
            .ok_or_else(|| anyhow!("card {:?} is not in the deck", self.card))?;
        state.cards.remove(pos);
        Ok(())
    }

    fn description(&self) -> String {
        format!("Add card \"{}\"", self.card)
    }
}

/// Move a card to a new position. Consecutive moves of the same card merge,
/// so a drag is one undo step.
struct MoveCard {
    deck: Deck,
    card: String,
    from: Option<usize>,
    to: usize,
}

impl MoveCard {
    fn new(deck: &Deck, card: &str, to: usize) -> Self {
        Self {
            deck: deck.clone(),
            card: card.to_string(),
            from: None,
            to,
        }
    }

    fn place(&self, index: usize) -> Result<usize> {
        let mut state = self.deck.lock();
        let current = state
            .cards
            .iter()
            .position(|c| *c == self.card)
            .with_context(|| format!("card {:?} is not in the deck", self.card))?;
        let card = state.cards.remove(current);
        let index = index.min(state.cards.len());
        state.cards.insert(index, card);
        Ok(current)
    }
}

#[async_trait]
impl Command for MoveCard {
    async fn execute(&mut self) -> Result<()> {
        let previous = self.place(self.to)?;
        // Only the first call knows where the drag started.
        self.from.get_or_insert(previous);
        Ok(())
    }

    async fn undo(&mut self) -> Result<()> {
        let Some(from) = self.from else {
            bail!("move of {:?} was never executed", self.card);
        };
        self.place(from)?;
        Ok(())
    }

    fn description(&self) -> String {
        format!("Move card \"{}\" to {}", self.card, self.to)
    }

    fn supports_merge(&self) -> bool {
        true
    }

    fn can_merge_with(&self, other: &dyn Command) -> bool {
        other
            .as_any()
            .downcast_ref::<MoveCard>()
            .is_some_and(|other| other.card == self.card)
    }

    fn merge_with(&mut self, other: Box<dyn Command>) {
        if let Ok(other) = other.into_any().downcast::<MoveCard>() {
            self.to = other.to;
        }
    }
}

struct RenameDeck {
    deck: Deck,
    from: Option<String>,
    to: String,
}

#[async_trait]
impl Command for RenameDeck {
    async fn execute(&mut self) -> Result<()> {
        let previous = std::mem::replace(&mut self.deck.lock().title, self.to.clone());
        self.from.get_or_insert(previous);
        Ok(())
    }

    async fn undo(&mut self) -> Result<()> {
        let from = self.from.clone().context("rename was never executed")?;
        self.deck.lock().title = from;
        Ok(())
    }

    fn description(&self) -> String {
        format!("Rename deck to \"{}\"", self.to)
    }
}

// =============================================================================
// Observer
// =============================================================================

/// Stand-in for the history panel: logs each event as its UI payload.
struct PanelLogger;

#[async_trait]
impl HistoryObserver for PanelLogger {
    async fn on_event(&self, event: &HistoryEvent, ctx: &ObserverContext) -> Result<()> {
        tracing::info!(seq = ctx.sequence, payload = %event.to_payload(), "history event");
        Ok(())
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,card_history=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting card history demo");

    let config = HistoryConfig::from_env().context("Failed to load history configuration")?;
    tracing::info!(
        max_history = config.max_history.get(),
        merge_window_ms = config.merge_window.as_millis() as u64,
        debug = config.debug,
        "history configured"
    );

    let manager = Arc::new(CommandManager::new(config));
    let panel = spawn_observer(manager.bus(), PanelLogger);

    let deck = Deck::new("Spanish verbs");
    for card in ["hablar", "comer", "vivir"] {
        manager
            .execute(Box::new(AddCard {
                deck: deck.clone(),
                card: card.to_string(),
            }))
            .await?;
    }

    // A quick drag: both moves land in one entry.
    manager.execute(Box::new(MoveCard::new(&deck, "vivir", 1))).await?;
    manager.execute(Box::new(MoveCard::new(&deck, "vivir", 0))).await?;

    manager
        .execute(Box::new(RenameDeck {
            deck: deck.clone(),
            from: None,
            to: "Verbos".to_string(),
        }))
        .await?;
    tracing::info!(deck = %deck.summary(), "after edits");

    manager.undo().await?;
    manager.undo().await?;
    tracing::info!(deck = %deck.summary(), "after two undos");

    manager.redo().await?;
    tracing::info!(deck = %deck.summary(), "after redo");

    // Jump back to the very first card.
    if let Some(first) = manager.history(None).last().cloned() {
        let traversal = manager.go_to_history(first.id).await?;
        tracing::info!(?traversal, deck = %deck.summary(), "after time travel");
    }

    let paste = CommandBatch::new("Paste 2 cards")
        .with(AddCard {
            deck: deck.clone(),
            card: "ser".to_string(),
        })
        .with(AddCard {
            deck: deck.clone(),
            card: "estar".to_string(),
        });
    manager.execute(Box::new(paste)).await?;
    tracing::info!(deck = %deck.summary(), "after paste");

    for (depth, entry) in manager.history(None).iter().enumerate() {
        tracing::info!(
            depth,
            id = %entry.id,
            merges = entry.merge_count,
            "{}",
            entry.description
        );
    }
    tracing::info!(
        can_undo = manager.can_undo(),
        can_redo = manager.can_redo(),
        "final state"
    );

    // Dropping the last manager handle closes the bus and stops the panel.
    drop(manager);
    panel.await.context("history panel task failed")?;

    Ok(())
}
