//! Wire messages exchanged with the robot bridge.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use robot_gateway_core::VideoFrame;
use serde::{Deserialize, Serialize};

use crate::{LowState, SportRequest, motion::SPORT_TOPIC};

/// Request to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRequest {
    pub id: u64,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestBody {
    /// Publish a sport-mode request.
    Publish {
        topic: String,
        #[serde(flatten)]
        request: SportRequest,
    },
    /// Read the latest low-state record.
    GetLowState,
    /// Read the latest camera frame.
    GetFrame,
    /// Liveness probe.
    Ping,
}

impl RequestBody {
    /// Publish `request` on the sport topic.
    #[must_use]
    pub fn sport(request: SportRequest) -> Self {
        Self::Publish {
            topic: SPORT_TOPIC.to_string(),
            request,
        }
    }
}

/// Reply from the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkReply {
    pub id: u64,
    #[serde(flatten)]
    pub body: ReplyBody,
}

/// Reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplyBody {
    /// Request accepted.
    Ack,
    /// Latest low-state record.
    LowState { state: LowState },
    /// Camera frame (base64 encoded).
    Frame { data: String, captured_at: i64 },
    /// No frame buffered.
    NoFrame,
    /// Liveness reply.
    Pong,
    /// Request failed on the robot side.
    Error { message: String },
}

impl ReplyBody {
    /// Create a frame reply from raw bytes.
    #[must_use]
    pub fn frame(frame: &VideoFrame) -> Self {
        Self::Frame {
            data: BASE64.encode(&frame.data),
            captured_at: frame.captured_at,
        }
    }

    /// Decode a frame reply.
    ///
    /// Returns `None` for other replies or undecodable data.
    #[must_use]
    pub fn decode_frame(&self) -> Option<VideoFrame> {
        if let Self::Frame { data, captured_at } = self {
            BASE64
                .decode(data)
                .ok()
                .map(|bytes| VideoFrame::new(Bytes::from(bytes), *captured_at))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use robot_gateway_core::CommandKind;

    use super::*;

    #[test]
    fn test_publish_wire_shape() {
        let req = LinkRequest {
            id: 7,
            body: RequestBody::sport(SportRequest::from(CommandKind::Forward)),
        };
        let json: serde_json::Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "publish");
        assert_eq!(json["topic"], "rt/api/sport/request");
        assert_eq!(json["api_id"], 1008);
        assert_eq!(json["parameter"]["x"], 0.5);
    }

    #[test]
    fn test_parse_replies() {
        let reply: LinkReply = serde_json::from_str(
            r#"{"id":3,"type":"low_state","state":{"bms_state":{"soc":50}}}"#,
        )
        .unwrap();
        assert_eq!(reply.id, 3);
        let ReplyBody::LowState { state } = reply.body else {
            panic!("Wrong reply type");
        };
        assert!((state.bms_state.soc - 50.0).abs() < 1e-9);

        let reply: LinkReply =
            serde_json::from_str(r#"{"id":4,"type":"error","message":"busy"}"#).unwrap();
        assert_eq!(
            reply.body,
            ReplyBody::Error {
                message: "busy".into()
            }
        );
    }

    #[test]
    fn test_frame_decoding() {
        let frame = VideoFrame::new(&b"\xFF\xD8jpeg"[..], 42);
        let decoded = ReplyBody::frame(&frame).decode_frame().unwrap();
        assert_eq!(decoded, frame);
        assert!(ReplyBody::Pong.decode_frame().is_none());
    }
}
