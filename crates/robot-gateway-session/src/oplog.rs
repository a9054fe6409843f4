//! Operation log sink.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use robot_gateway_core::{
    GatewayError, LogEntry, LogFeed, OperationLogStore, UserId, now_millis,
    traits::StorageError,
};

/// Append-only, user-attributed record of gateway operations.
///
/// Writes are best-effort: a failed append is reported through tracing and
/// the failure counter, never to the operation being recorded.
pub struct OperationLog<L> {
    store: L,
    feed: Arc<LogFeed>,
    failures: AtomicU64,
}

impl<L: OperationLogStore> OperationLog<L> {
    /// Create a sink over `store`.
    #[must_use]
    pub fn new(store: L) -> Self {
        Self {
            store,
            feed: Arc::new(LogFeed::new()),
            failures: AtomicU64::new(0),
        }
    }

    /// Append an entry attributed to `user`.
    ///
    /// # Errors
    /// Returns `LogWriteFailure` if the store rejects the entry.
    pub async fn append(
        &self,
        operation: impl Into<String>,
        user: &UserId,
    ) -> Result<LogEntry, GatewayError> {
        let entry = LogEntry::new(operation, now_millis(), user.clone());
        match self.store.append(entry).await {
            Ok(stored) => {
                tracing::debug!(seq = stored.seq, user = %stored.user_id, "{}", stored.operation);
                self.feed.push(stored.clone());
                Ok(stored)
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                let err = GatewayError::from(e);
                tracing::error!(user = %user, "Failed to append operation log entry: {err}");
                Err(err)
            }
        }
    }

    /// Append, reporting but otherwise ignoring failure.
    pub(crate) async fn record(&self, operation: impl Into<String>, user: &UserId) {
        let _ = self.append(operation, user).await;
    }

    /// The most recent `limit` entries, newest first.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn query(&self, limit: usize) -> Result<Vec<LogEntry>, StorageError> {
        self.store.query(limit).await
    }

    /// Live feed of appended entries.
    #[must_use]
    pub fn feed(&self) -> Arc<LogFeed> {
        Arc::clone(&self.feed)
    }

    /// Number of appends that failed since start.
    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
