//! Collaborator traits for the robot link and operation log storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CommandKind, RobotAddress, TelemetrySnapshot, UserId, VideoFrame};

/// Robot transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),
    #[error("Robot link is not open")]
    NotOpen,
    #[error("Robot rejected request: {0}")]
    Rejected(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Trait for the link to one physical robot.
///
/// The gateway guarantees `connect` is only called while no link is open
/// and that `disconnect` follows every successful `connect`.
#[async_trait]
pub trait RobotTransport: Send + Sync {
    /// Open the link to the robot at `address`.
    async fn connect(&self, address: RobotAddress) -> Result<(), TransportError>;

    /// Close the link.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Send one command and wait for the robot to acknowledge it.
    async fn send_command(&self, command: CommandKind) -> Result<(), TransportError>;

    /// Fetch the latest status reading.
    async fn fetch_status(&self) -> Result<TelemetrySnapshot, TransportError>;

    /// Fetch the latest buffered camera frame, if any.
    async fn fetch_frame(&self) -> Result<Option<VideoFrame>, TransportError>;

    /// Liveness probe.
    async fn heartbeat(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// One operation log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Store-assigned insertion sequence number.
    #[serde(default)]
    pub seq: u64,
    /// Human-readable operation text, e.g. `Sent command: stop`.
    pub operation: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    /// User the operation is attributed to.
    pub user_id: UserId,
}

impl LogEntry {
    /// Create an unsequenced entry.
    #[must_use]
    pub fn new(operation: impl Into<String>, timestamp: i64, user_id: UserId) -> Self {
        Self {
            seq: 0,
            operation: operation.into(),
            timestamp,
            user_id,
        }
    }
}

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for operation log storage backends.
///
/// Stores are append-only: there is no update or delete.
#[async_trait]
pub trait OperationLogStore: Send + Sync {
    /// Append an entry. The store assigns `seq`; the stored entry is returned.
    async fn append(&self, entry: LogEntry) -> Result<LogEntry, StorageError>;

    /// The most recent `limit` entries, newest first.
    ///
    /// Entries with equal timestamps are ordered by insertion.
    async fn query(&self, limit: usize) -> Result<Vec<LogEntry>, StorageError>;
}

#[async_trait]
impl<T: RobotTransport + ?Sized> RobotTransport for std::sync::Arc<T> {
    async fn connect(&self, address: RobotAddress) -> Result<(), TransportError> {
        (**self).connect(address).await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        (**self).disconnect().await
    }

    async fn send_command(&self, command: CommandKind) -> Result<(), TransportError> {
        (**self).send_command(command).await
    }

    async fn fetch_status(&self) -> Result<TelemetrySnapshot, TransportError> {
        (**self).fetch_status().await
    }

    async fn fetch_frame(&self) -> Result<Option<VideoFrame>, TransportError> {
        (**self).fetch_frame().await
    }

    async fn heartbeat(&self) -> Result<(), TransportError> {
        (**self).heartbeat().await
    }
}

#[async_trait]
impl<S: OperationLogStore + ?Sized> OperationLogStore for std::sync::Arc<S> {
    async fn append(&self, entry: LogEntry) -> Result<LogEntry, StorageError> {
        (**self).append(entry).await
    }

    async fn query(&self, limit: usize) -> Result<Vec<LogEntry>, StorageError> {
        (**self).query(limit).await
    }
}
