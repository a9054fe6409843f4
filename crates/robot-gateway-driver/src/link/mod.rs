//! JSON-lines link to a robot-side bridge.
//!
//! The bridge runs next to the robot and exposes its sport API, low-state
//! topic and camera over a plain TCP socket, one JSON object per line.
//! Requests carry an `id`; the bridge answers each with the same `id`, in
//! any order.

pub mod client;
pub mod protocol;

pub use client::TcpRobotLink;
pub use protocol::{LinkReply, LinkRequest, ReplyBody, RequestBody};

/// Default bridge port.
pub const DEFAULT_PORT: u16 = 8082;
