//! Message types for room actor communication.
//!
//! Each request carries a oneshot `respond_to` channel. Close watchers and
//! fire-and-forget bookkeeping messages have no response.

use crate::errors::RcError;
use crate::media::{AppData, Consumer, Producer, Router, WebRtcTransport};

use super::peer::PeerNotifier;

use common::types::{ConnectionId, MediaKind, TransportRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Messages handled by a `RoomActor`.
pub enum RoomMessage {
    /// Insert (or reset) a peer session and snapshot existing producers.
    Join {
        connection_id: ConnectionId,
        notifier: PeerNotifier,
        respond_to: oneshot::Sender<Result<JoinResult, RcError>>,
    },

    /// Remove a peer session, closing its resources. Idempotent.
    Leave {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<LeaveOutcome>,
    },

    /// Validate the peer before a transport is created outside the actor.
    PrepareTransport {
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<Result<TransportTicket, RcError>>,
    },

    /// Record a transport created by the engine.
    AttachTransport {
        connection_id: ConnectionId,
        session: u64,
        role: TransportRole,
        transport: Arc<dyn WebRtcTransport>,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    /// Look up one of the caller's transports, optionally checking its role.
    FindTransport {
        connection_id: ConnectionId,
        transport_id: String,
        expected_role: Option<TransportRole>,
        respond_to: oneshot::Sender<Result<TransportLookup, RcError>>,
    },

    /// DTLS handshake completed for a transport.
    MarkTransportConnected {
        connection_id: ConnectionId,
        transport_id: String,
    },

    /// Record a producer and announce it to the other peers.
    AttachProducer {
        connection_id: ConnectionId,
        session: u64,
        transport_id: String,
        producer: Arc<dyn Producer>,
        app_data: AppData,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    /// Validate a consume request and evaluate the router's capability gate.
    PrepareConsume {
        connection_id: ConnectionId,
        transport_id: String,
        producer_id: String,
        rtp_capabilities: Value,
        respond_to: oneshot::Sender<Result<ConsumeTicket, RcError>>,
    },

    /// Record a consumer created by the engine.
    AttachConsumer {
        connection_id: ConnectionId,
        session: u64,
        transport_id: String,
        consumer: Arc<dyn Consumer>,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    /// Look up one of the caller's consumers.
    FindConsumer {
        connection_id: ConnectionId,
        consumer_id: String,
        respond_to: oneshot::Sender<Result<Arc<dyn Consumer>, RcError>>,
    },

    /// Update a producer's mute flag and broadcast the change.
    MuteToggle {
        sender: ConnectionId,
        target: ConnectionId,
        kind: MediaKind,
        is_muted: bool,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    /// Engine reported a transport closed.
    TransportClosed {
        connection_id: ConnectionId,
        transport_id: String,
    },

    /// Engine reported a producer closed.
    ProducerClosed {
        connection_id: ConnectionId,
        producer_id: String,
    },

    /// Engine reported a consumer closed.
    ConsumerClosed {
        connection_id: ConnectionId,
        consumer_id: String,
    },

    /// Get current room state.
    GetState {
        respond_to: oneshot::Sender<RoomState>,
    },
}

impl RoomMessage {
    /// Short message name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            RoomMessage::Join { .. } => "join",
            RoomMessage::Leave { .. } => "leave",
            RoomMessage::PrepareTransport { .. } => "prepare_transport",
            RoomMessage::AttachTransport { .. } => "attach_transport",
            RoomMessage::FindTransport { .. } => "find_transport",
            RoomMessage::MarkTransportConnected { .. } => "mark_transport_connected",
            RoomMessage::AttachProducer { .. } => "attach_producer",
            RoomMessage::PrepareConsume { .. } => "prepare_consume",
            RoomMessage::AttachConsumer { .. } => "attach_consumer",
            RoomMessage::FindConsumer { .. } => "find_consumer",
            RoomMessage::MuteToggle { .. } => "mute_toggle",
            RoomMessage::TransportClosed { .. } => "transport_closed",
            RoomMessage::ProducerClosed { .. } => "producer_closed",
            RoomMessage::ConsumerClosed { .. } => "consumer_closed",
            RoomMessage::GetState { .. } => "get_state",
        }
    }
}

/// A producer as seen by other peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub producer_id: String,
    pub kind: MediaKind,
    pub connection_id: ConnectionId,
    pub app_data: AppData,
}

/// Result of a successful join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResult {
    pub rtp_capabilities: Value,
    pub existing_producers: Vec<ProducerInfo>,
}

/// Result of a leave request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The peer was present and has been removed.
    pub removed: bool,
    /// The room became empty and closed.
    pub room_closed: bool,
}

/// Returned by `PrepareTransport`: the router to create the transport on and
/// the session generation the result must attach to.
#[derive(Clone)]
pub struct TransportTicket {
    pub router: Arc<dyn Router>,
    pub session: u64,
}

/// Returned by `FindTransport`.
#[derive(Clone)]
pub struct TransportLookup {
    pub transport: Arc<dyn WebRtcTransport>,
    pub role: TransportRole,
    pub session: u64,
}

/// Returned by `PrepareConsume` once the capability gate passed.
#[derive(Clone)]
pub struct ConsumeTicket {
    pub transport: Arc<dyn WebRtcTransport>,
    pub session: u64,
    pub kind: MediaKind,
    /// The producer's `appData` at gate time.
    pub producer_app_data: AppData,
}

/// Derived phase of a peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerPhase {
    /// No transports yet.
    Joined,
    /// At least one transport not yet connected.
    Negotiating,
    /// All transports connected.
    Active,
}

/// Snapshot of one peer session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerState {
    pub connection_id: ConnectionId,
    pub phase: PeerPhase,
    pub transport_ids: Vec<String>,
    pub producer_ids: Vec<String>,
    pub consumer_ids: Vec<String>,
}

/// Snapshot of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_id: String,
    pub router_id: String,
    /// Unix timestamp (seconds).
    pub created_at: i64,
    pub peers: Vec<PeerState>,
}

impl RoomState {
    /// Find a peer by connection id.
    #[must_use]
    pub fn peer(&self, connection_id: ConnectionId) -> Option<&PeerState> {
        self.peers.iter().find(|p| p.connection_id == connection_id)
    }
}

// ============================================================================
// Notifications (server -> client events)
// ============================================================================

/// `newProducer` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProducerEvent {
    pub producer_id: String,
    pub kind: MediaKind,
    pub app_data: AppData,
    pub connection_id: ConnectionId,
}

/// `peerLeft` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerLeftEvent {
    pub connection_id: ConnectionId,
}

/// `peerMuteChange` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerMuteChangeEvent {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub is_muted: bool,
    pub connection_id: ConnectionId,
}

/// Room broadcast delivered through a peer's notifier.
///
/// Serializes as `{"event": <name>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum RoomNotification {
    NewProducer(NewProducerEvent),
    PeerLeft(PeerLeftEvent),
    PeerMuteChange(PeerMuteChangeEvent),
}

impl RoomNotification {
    /// Wire event name (also the metric label).
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            RoomNotification::NewProducer(_) => "newProducer",
            RoomNotification::PeerLeft(_) => "peerLeft",
            RoomNotification::PeerMuteChange(_) => "peerMuteChange",
        }
    }
}
