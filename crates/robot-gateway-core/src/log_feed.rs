//! Broadcast + history feed of operation log entries.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::LogEntry;

/// Number of recent entries replayed to new observers.
const HISTORY_ENTRIES: usize = 256;

/// Live feed of appended log entries.
///
/// New observers receive recent history, then switch to live entries.
pub struct LogFeed {
    history: RwLock<VecDeque<LogEntry>>,
    sender: broadcast::Sender<LogEntry>,
}

impl Default for LogFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl LogFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            history: RwLock::new(VecDeque::with_capacity(32)),
            sender,
        }
    }

    /// Publish an entry to live observers and history.
    pub fn push(&self, entry: LogEntry) {
        let mut history = self.history.write().unwrap_or_else(PoisonError::into_inner);
        if history.len() == HISTORY_ENTRIES {
            history.pop_front();
        }
        history.push_back(entry.clone());
        let _ = self.sender.send(entry); // live observers
    }

    /// Get a receiver for live entries.
    #[must_use]
    pub fn get_receiver(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    /// Snapshot of the retained history, oldest first.
    #[must_use]
    pub fn get_history(&self) -> Vec<LogEntry> {
        self.history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Stream that yields history first, then live entries.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, LogEntry> {
        // Snapshot and subscribe under the same lock `push` holds.
        let (history, rx) = {
            let guard = self.history.read().unwrap_or_else(PoisonError::into_inner);
            (guard.iter().cloned().collect::<Vec<_>>(), self.get_receiver())
        };

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move {
            match res {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Log feed observer lagged: {e}");
                    None
                }
            }
        });

        Box::pin(hist.chain(live))
    }

    /// SSE stream (requires `sse` feature).
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn sse_stream(
        &self,
    ) -> futures::stream::BoxStream<'static, Result<axum::response::sse::Event, std::io::Error>>
    {
        self.history_plus_stream()
            .map(|entry| {
                axum::response::sse::Event::default()
                    .event("log")
                    .id(entry.seq.to_string())
                    .json_data(&entry)
                    .map_err(std::io::Error::other)
            })
            .boxed()
    }
}
