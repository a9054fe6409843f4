//! Core abstractions for the robot session gateway.
//!
//! This crate provides the fundamental building blocks:
//! - `RobotAddress` - Validated IPv4 robot address
//! - `CommandKind` - The fixed command vocabulary
//! - `TelemetrySnapshot` / `VideoFrame` - Data relayed from the robot
//! - `LogEntry` and `LogFeed` - Operation log records and their live feed
//! - `GatewayError` - The error taxonomy surfaced to callers
//! - Transport, storage and identity traits

pub mod address;
pub mod command;
pub mod config;
pub mod error;
pub mod identity;
pub mod log_feed;
pub mod telemetry;
pub mod traits;

pub use address::RobotAddress;
pub use command::CommandKind;
pub use config::GatewayConfig;
pub use error::{ErrorKind, GatewayError};
pub use identity::{IdentityProvider, Role, StaticIdentity, User, UserId};
pub use log_feed::LogFeed;
pub use telemetry::{TelemetrySnapshot, VideoFrame};
pub use traits::{LogEntry, OperationLogStore, RobotTransport};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
