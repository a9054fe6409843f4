//! Robot transports for the session gateway.
//!
//! Provides:
//! - Sport-mode motion request mapping for the command vocabulary
//! - Raw low-state sensor record and its telemetry mapping
//! - `SimulatedRobot` - In-process robot for development and tests
//! - `TcpRobotLink` - JSON-lines link to a robot-side bridge

pub mod link;
pub mod motion;
pub mod sensor;
pub mod simulated;

pub use link::TcpRobotLink;
pub use motion::{MoveParameter, SportRequest};
pub use sensor::LowState;
pub use simulated::SimulatedRobot;
