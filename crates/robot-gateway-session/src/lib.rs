//! Session gateway for a single networked robot.
//!
//! Provides:
//! - `Gateway` - Connection manager owning the exclusive robot session
//! - Command dispatch and telemetry/video relay on top of the session
//! - `OperationLog` - Best-effort, user-attributed operation log sink
//! - Log storage implementations (memory, SQLite)

pub mod dispatcher;
pub mod manager;
pub mod oplog;
pub mod relay;
pub mod storage;

pub use manager::{Gateway, Session, SessionStatus};
pub use oplog::OperationLog;
pub use relay::{RelayStream, SubscriptionHandle};
