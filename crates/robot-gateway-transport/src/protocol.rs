//! WebSocket wire protocol.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use robot_gateway_core::{CommandKind, ErrorKind, GatewayError, TelemetrySnapshot, VideoFrame};
use robot_gateway_session::RelayStream;
use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Send a command (raw text, validated server-side).
    Command { command: String },
    /// Start relaying a stream; the interval defaults per stream.
    Subscribe {
        stream: RelayStream,
        #[serde(default)]
        interval_ms: Option<u64>,
    },
    /// Stop relaying a stream.
    Unsubscribe { stream: RelayStream },
    /// Ping for keepalive.
    Ping,
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Latest telemetry reading.
    Telemetry(TelemetrySnapshot),
    /// Camera frame (base64 encoded).
    Frame { data: String, captured_at: i64 },
    /// Command acknowledged by the robot.
    CommandAck { command: CommandKind },
    /// Request failed.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
        message: String,
    },
    /// A relay keeps failing; the subscription stays active.
    RelayFailure { stream: RelayStream, message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    /// Create a frame message from a captured frame.
    #[must_use]
    pub fn frame(frame: &VideoFrame) -> Self {
        Self::Frame {
            data: BASE64.encode(&frame.data),
            captured_at: frame.captured_at,
        }
    }

    /// Decode frame data from base64.
    #[must_use]
    pub fn decode_frame(&self) -> Option<Vec<u8>> {
        if let Self::Frame { data, .. } = self {
            BASE64.decode(data).ok()
        } else {
            None
        }
    }

    /// Error reply for a failed gateway operation.
    #[must_use]
    pub fn error(err: &GatewayError) -> Self {
        Self::Error {
            kind: Some(err.kind()),
            message: err.to_string(),
        }
    }
}
