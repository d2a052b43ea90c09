//! JSON wire protocol for the signaling socket.
//!
//! ```text
//! client -> server  {"event": "joinRoom", "data": {...}, "ackId": 7}
//! server -> client  {"ack": 7, "data": {...}}
//! server -> client  {"event": "newProducer", "data": {...}}
//! ```
//!
//! Event names and field names are the public wire contract.

use crate::errors::RcError;
use crate::media::AppData;

use common::types::{ConnectionId, MediaKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Envelope of every client frame, before the event payload is decoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    ack_id: Option<u64>,
}

/// A decoded client frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientFrame {
    pub ack_id: Option<u64>,
    pub event: ClientEvent,
}

/// A frame that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidFrame {
    /// Present when the envelope parsed but the payload did not.
    pub ack_id: Option<u64>,
    pub error: String,
}

impl ClientFrame {
    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFrame` for malformed JSON, unknown events and payloads
    /// missing required fields.
    pub fn parse(text: &str) -> Result<Self, InvalidFrame> {
        let raw: RawFrame = serde_json::from_str(text).map_err(|e| InvalidFrame {
            ack_id: None,
            error: format!("malformed frame: {e}"),
        })?;

        let event = ClientEvent::from_parts(&raw.event, raw.data).map_err(|error| InvalidFrame {
            ack_id: raw.ack_id,
            error,
        })?;

        Ok(Self {
            ack_id: raw.ack_id,
            event,
        })
    }
}

/// Client -> server signaling events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
    },
    LeaveCall {
        room_id: String,
    },
    CreateWebRtcTransport {
        /// `true` for a send (producer) transport.
        sender: bool,
        room_id: String,
    },
    ConnectTransport {
        room_id: String,
        transport_id: String,
        dtls_parameters: Value,
    },
    ProduceTransport {
        room_id: String,
        transport_id: String,
        kind: MediaKind,
        #[serde(default)]
        app_data: AppData,
        rtp_parameters: Value,
    },
    Consume {
        room_id: String,
        transport_id: String,
        producer_id: String,
        rtp_capabilities: Value,
        #[serde(default)]
        app_data: AppData,
    },
    ResumeConsumer {
        room_id: String,
        consumer_id: String,
    },
    MuteToggle {
        room_id: String,
        #[serde(rename = "type")]
        kind: MediaKind,
        is_muted: bool,
        /// Peer whose producer is flagged; the sender when absent.
        #[serde(default)]
        connection_id: Option<ConnectionId>,
    },
}

/// How an event's ack payload is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckShape {
    /// No ack.
    None,
    /// Result or `{error, code}` at top level.
    Bare,
    /// Result or `{error, code}` under `params`.
    Params,
    /// `{params: {success}}`.
    Success,
}

impl ClientEvent {
    /// Decode `data` as the payload of event `name`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem for unknown events or bad payloads.
    pub fn from_parts(name: &str, data: Value) -> Result<Self, String> {
        serde_json::from_value(json!({ "event": name, "data": data }))
            .map_err(|e| format!("invalid {name} event: {e}"))
    }

    /// Wire event name (also the metric label).
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "joinRoom",
            ClientEvent::LeaveCall { .. } => "leaveCall",
            ClientEvent::CreateWebRtcTransport { .. } => "createWebRtcTransport",
            ClientEvent::ConnectTransport { .. } => "connectTransport",
            ClientEvent::ProduceTransport { .. } => "produceTransport",
            ClientEvent::Consume { .. } => "consume",
            ClientEvent::ResumeConsumer { .. } => "resumeConsumer",
            ClientEvent::MuteToggle { .. } => "muteToggle",
        }
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        match self {
            ClientEvent::JoinRoom { room_id }
            | ClientEvent::LeaveCall { room_id }
            | ClientEvent::CreateWebRtcTransport { room_id, .. }
            | ClientEvent::ConnectTransport { room_id, .. }
            | ClientEvent::ProduceTransport { room_id, .. }
            | ClientEvent::Consume { room_id, .. }
            | ClientEvent::ResumeConsumer { room_id, .. }
            | ClientEvent::MuteToggle { room_id, .. } => room_id,
        }
    }

    #[must_use]
    pub fn ack_shape(&self) -> AckShape {
        match self {
            ClientEvent::JoinRoom { .. } | ClientEvent::ProduceTransport { .. } => AckShape::Bare,
            ClientEvent::CreateWebRtcTransport { .. } | ClientEvent::Consume { .. } => {
                AckShape::Params
            }
            ClientEvent::ResumeConsumer { .. } => AckShape::Success,
            ClientEvent::LeaveCall { .. }
            | ClientEvent::ConnectTransport { .. }
            | ClientEvent::MuteToggle { .. } => AckShape::None,
        }
    }

    #[must_use]
    pub fn expects_ack(&self) -> bool {
        self.ack_shape() != AckShape::None
    }
}

/// Error payload of a failed ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: i32,
}

impl From<&RcError> for ErrorBody {
    fn from(err: &RcError) -> Self {
        Self {
            error: err.client_message(),
            code: err.error_code(),
        }
    }
}

/// `{params: ...}` wrapper used by transport and consume acks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params<T> {
    pub params: T,
}

/// Ack of `produceTransport`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceResult {
    pub id: String,
}

/// Ack of `resumeConsumer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeResult {
    pub success: bool,
}

/// Server -> client ack frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckFrame {
    pub ack: u64,
    pub data: Value,
}

/// Build the ack payload for a failed event.
#[must_use]
pub fn error_reply(shape: AckShape, err: &RcError) -> Option<Value> {
    let body = ErrorBody::from(err);
    match shape {
        AckShape::None => None,
        AckShape::Bare => Some(to_value(&body)),
        AckShape::Params => Some(to_value(&Params { params: body })),
        AckShape::Success => Some(to_value(&Params {
            params: ResumeResult { success: false },
        })),
    }
}

/// Serialize a reply payload, falling back to an internal error body.
#[must_use]
pub fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        json!({
            "error": format!("failed to encode reply: {e}"),
            "code": RcError::Internal(String::new()).error_code(),
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_room_with_ack() {
        let frame =
            ClientFrame::parse(r#"{"event":"joinRoom","data":{"roomId":"r1"},"ackId":3}"#).unwrap();
        assert_eq!(frame.ack_id, Some(3));
        assert_eq!(
            frame.event,
            ClientEvent::JoinRoom {
                room_id: "r1".to_string()
            }
        );
        assert_eq!(frame.event.name(), "joinRoom");
        assert_eq!(frame.event.ack_shape(), AckShape::Bare);
    }

    #[test]
    fn test_parse_create_transport() {
        let frame = ClientFrame::parse(
            r#"{"event":"createWebRtcTransport","data":{"sender":true,"roomId":"r1"},"ackId":1}"#,
        )
        .unwrap();
        assert_eq!(
            frame.event,
            ClientEvent::CreateWebRtcTransport {
                sender: true,
                room_id: "r1".to_string()
            }
        );
        assert_eq!(frame.event.room_id(), "r1");
    }

    #[test]
    fn test_parse_produce_defaults_app_data() {
        let frame = ClientFrame::parse(
            r#"{"event":"produceTransport","data":{"roomId":"r1","transportId":"t1","kind":"audio","rtpParameters":{"codecs":[]}}}"#,
        )
        .unwrap();
        match frame.event {
            ClientEvent::ProduceTransport { kind, app_data, .. } => {
                assert_eq!(kind, MediaKind::Audio);
                assert!(app_data.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(frame.ack_id, None);
    }

    #[test]
    fn test_parse_mute_toggle_type_field() {
        let target = ConnectionId::new();
        let text = format!(
            r#"{{"event":"muteToggle","data":{{"roomId":"r1","type":"video","isMuted":true,"connectionId":"{target}"}}}}"#
        );
        let frame = ClientFrame::parse(&text).unwrap();
        assert_eq!(
            frame.event,
            ClientEvent::MuteToggle {
                room_id: "r1".to_string(),
                kind: MediaKind::Video,
                is_muted: true,
                connection_id: Some(target),
            }
        );
        assert!(!frame.event.expects_ack());
    }

    #[test]
    fn test_unknown_event_keeps_ack_id() {
        let err = ClientFrame::parse(r#"{"event":"sendChat","data":{},"ackId":9}"#).unwrap_err();
        assert_eq!(err.ack_id, Some(9));
        assert!(err.error.contains("sendChat"));
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let err = ClientFrame::parse(r#"{"event":"consume","data":{"roomId":"r1"},"ackId":2}"#)
            .unwrap_err();
        assert_eq!(err.ack_id, Some(2));
    }

    #[test]
    fn test_malformed_json_has_no_ack() {
        let err = ClientFrame::parse("{not json").unwrap_err();
        assert_eq!(err.ack_id, None);
    }

    #[test]
    fn test_error_reply_shapes() {
        let err = RcError::ProducerNotFound("p".to_string());

        assert_eq!(error_reply(AckShape::None, &err), None);
        assert_eq!(
            error_reply(AckShape::Bare, &err).unwrap(),
            json!({"error": "Producer not found", "code": 4})
        );
        assert_eq!(
            error_reply(AckShape::Params, &err).unwrap(),
            json!({"params": {"error": "Producer not found", "code": 4}})
        );
        assert_eq!(
            error_reply(AckShape::Success, &err).unwrap(),
            json!({"params": {"success": false}})
        );
    }

    #[test]
    fn test_ack_frame_shape() {
        let frame = AckFrame {
            ack: 4,
            data: to_value(&ProduceResult {
                id: "p-1".to_string(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"ack": 4, "data": {"id": "p-1"}})
        );
    }
}
