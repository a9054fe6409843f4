//! Gateway error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    CommandKind, RobotAddress,
    address::AddressError,
    traits::{StorageError, TransportError},
};

/// Error returned by gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Invalid robot address: {0:?}")]
    InvalidAddress(String),
    #[error("Already connected to robot at {0}")]
    AlreadyConnected(RobotAddress),
    #[error("Not connected to robot")]
    NotConnected,
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),
    #[error("Command {command} timed out after {timeout_ms} ms")]
    CommandTimeout { command: CommandKind, timeout_ms: u64 },
    #[error("No video frame available")]
    NoFrameAvailable,
    #[error("Transport failure: {0}")]
    TransportFailure(String),
    #[error("Operation log write failed: {0}")]
    LogWriteFailure(String),
}

/// Discriminant of [`GatewayError`], used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidAddress,
    AlreadyConnected,
    NotConnected,
    UnknownCommand,
    CommandTimeout,
    NoFrameAvailable,
    TransportFailure,
    LogWriteFailure,
}

impl GatewayError {
    /// The error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAddress(_) => ErrorKind::InvalidAddress,
            Self::AlreadyConnected(_) => ErrorKind::AlreadyConnected,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::UnknownCommand(_) => ErrorKind::UnknownCommand,
            Self::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            Self::NoFrameAvailable => ErrorKind::NoFrameAvailable,
            Self::TransportFailure(_) => ErrorKind::TransportFailure,
            Self::LogWriteFailure(_) => ErrorKind::LogWriteFailure,
        }
    }
}

impl From<AddressError> for GatewayError {
    fn from(e: AddressError) -> Self {
        Self::InvalidAddress(e.input)
    }
}

impl From<TransportError> for GatewayError {
    fn from(e: TransportError) -> Self {
        Self::TransportFailure(e.to_string())
    }
}

impl From<StorageError> for GatewayError {
    fn from(e: StorageError) -> Self {
        Self::LogWriteFailure(e.to_string())
    }
}
