use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;

use crate::bus::DEFAULT_CAPACITY;

/// Default number of retained undo entries.
pub const DEFAULT_MAX_HISTORY: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => unreachable!(),
};

/// Default merge window.
pub const DEFAULT_MERGE_WINDOW: Duration = Duration::from_millis(500);

/// Command history configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Maximum retained undo-stack entries. The oldest are evicted beyond it.
    pub max_history: NonZeroUsize,
    /// Maximum gap between two commits for them to merge.
    pub merge_window: Duration,
    /// Log every lifecycle transition.
    pub debug: bool,
    /// Abandon command calls that take longer than this. `None` waits forever.
    pub command_timeout: Option<Duration>,
    /// Capacity of the event bus created by the manager.
    pub event_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history: DEFAULT_MAX_HISTORY,
            merge_window: DEFAULT_MERGE_WINDOW,
            debug: false,
            command_timeout: None,
            event_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl HistoryConfig {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional and falls back to the default:
    /// `HISTORY_MAX_ENTRIES`, `HISTORY_MERGE_WINDOW_MS`, `HISTORY_DEBUG`,
    /// `HISTORY_COMMAND_TIMEOUT_MS`, `HISTORY_EVENT_CAPACITY`.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let max_history = match lookup("HISTORY_MAX_ENTRIES") {
            Some(raw) => {
                let n: usize = raw
                    .trim()
                    .parse()
                    .context("HISTORY_MAX_ENTRIES must be a valid number")?;
                NonZeroUsize::new(n)
                    .ok_or_else(|| anyhow!("HISTORY_MAX_ENTRIES must be at least 1"))?
            }
            None => defaults.max_history,
        };

        let merge_window = match lookup("HISTORY_MERGE_WINDOW_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .context("HISTORY_MERGE_WINDOW_MS must be a number of milliseconds")?,
            ),
            None => defaults.merge_window,
        };

        let debug = match lookup("HISTORY_DEBUG") {
            Some(raw) => parse_flag(&raw).context("HISTORY_DEBUG must be true or false")?,
            None => defaults.debug,
        };

        let command_timeout = match lookup("HISTORY_COMMAND_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .context("HISTORY_COMMAND_TIMEOUT_MS must be a number of milliseconds")?;
                // 0 disables the timeout
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            None => defaults.command_timeout,
        };

        let event_capacity = match lookup("HISTORY_EVENT_CAPACITY") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("HISTORY_EVENT_CAPACITY must be a valid number")?,
            None => defaults.event_capacity,
        };

        Ok(Self {
            max_history,
            merge_window,
            debug,
            command_timeout,
            event_capacity,
        })
    }

    /// Set the maximum number of retained undo entries.
    pub fn with_max_history(mut self, max_history: NonZeroUsize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Set the merge window.
    pub fn with_merge_window(mut self, merge_window: Duration) -> Self {
        self.merge_window = merge_window;
        self
    }

    /// Enable or disable lifecycle logging.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Abandon command calls that run longer than `timeout`.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Set the capacity of the manager's own event bus.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(anyhow!("unrecognized flag value {other:?}")),
    }
}
