//! HTTP and WebSocket surface for the robot gateway.
//!
//! Provides:
//! - Wire protocol (JSON, `type`-tagged; frames base64)
//! - JSON-over-HTTP routes with bearer-token auth (feature: web)
//! - WebSocket live channel for commands, telemetry and video (feature: web)

pub mod protocol;

#[cfg(feature = "web")]
pub mod auth;
#[cfg(feature = "web")]
pub mod error;
#[cfg(feature = "web")]
pub mod http;
#[cfg(feature = "web")]
pub mod websocket;

#[cfg(feature = "web")]
pub use error::ApiError;
#[cfg(feature = "web")]
pub use http::{AppState, DynGateway, router};
pub use protocol::{ClientMessage, ServerMessage};
