//! In-memory operation log storage.

use std::sync::RwLock;

use async_trait::async_trait;
use robot_gateway_core::{LogEntry, OperationLogStore, traits::StorageError};

/// In-memory storage implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    log: RwLock<Log>,
}

#[derive(Debug, Default)]
struct Log {
    entries: Vec<LogEntry>,
    /// Set once an entry is appended with an older timestamp than its
    /// predecessor.
    out_of_order: bool,
}

impl MemoryLogStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self
            .log
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .entries
            .len())
    }

    /// Whether the store holds no entries.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        self.len().map(|n| n == 0)
    }
}

#[async_trait]
impl OperationLogStore for MemoryLogStore {
    async fn append(&self, mut entry: LogEntry) -> Result<LogEntry, StorageError> {
        let mut log = self
            .log
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        if log.entries.last().is_some_and(|last| last.timestamp > entry.timestamp) {
            log.out_of_order = true;
        }
        entry.seq = log.entries.len() as u64 + 1;
        log.entries.push(entry.clone());

        Ok(entry)
    }

    async fn query(&self, limit: usize) -> Result<Vec<LogEntry>, StorageError> {
        let log = self
            .log
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        // Appends normally arrive in timestamp order, so the tail is the answer.
        if !log.out_of_order {
            return Ok(log.entries.iter().rev().take(limit).cloned().collect());
        }

        // Newest first; insertion order breaks timestamp ties
        let mut result: Vec<LogEntry> = log.entries.clone();
        result.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        result.truncate(limit);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use robot_gateway_core::UserId;

    use super::*;

    fn entry(op: &str, timestamp: i64) -> LogEntry {
        LogEntry::new(op, timestamp, UserId::new("alice"))
    }

    #[tokio::test]
    async fn test_assigns_sequence() {
        let store = MemoryLogStore::new();
        assert!(store.is_empty().unwrap());
        let first = store.append(entry("a", 10)).await.unwrap();
        let second = store.append(entry("b", 10)).await.unwrap();
        assert_eq!((first.seq, second.seq), (1, 2));
        assert_eq!(store.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_query_in_order_log_reads_tail() {
        let store = MemoryLogStore::new();
        for (op, ts) in [("a", 10), ("b", 10), ("c", 20), ("d", 30)] {
            store.append(entry(op, ts)).await.unwrap();
        }

        let ops: Vec<String> = store
            .query(3)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, ["d", "c", "b"]);
        assert!(store.query(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_newest_first_with_ties() {
        let store = MemoryLogStore::new();
        for (op, ts) in [("a", 10), ("b", 20), ("c", 20), ("d", 15)] {
            store.append(entry(op, ts)).await.unwrap();
        }

        let ops: Vec<String> = store
            .query(10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.operation)
            .collect();
        assert_eq!(ops, ["c", "b", "d", "a"]);

        assert_eq!(store.query(2).await.unwrap().len(), 2);
        assert!(store.query(0).await.unwrap().is_empty());
    }
}
