//! Per-connection signaling state machine.
//!
//! A `SignalingSession` turns decoded client events into registry, room and
//! negotiation calls and builds the ack payloads. It is transport-agnostic:
//! the WebSocket handler feeds it text frames, tests drive it directly.
//!
//! Events of one connection are handled strictly in order; the caller must
//! await each call before passing the next frame.

use crate::actors::{PeerNotifier, RoomActorHandle, RoomRegistry};
use crate::errors::RcError;
use crate::negotiation;
use crate::observability::metrics as prom;

use super::protocol::{
    error_reply, to_value, AckFrame, ClientEvent, ClientFrame, ErrorBody, Params,
    ProduceResult, ResumeResult,
};

use common::types::{ConnectionId, TransportRole};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Signaling state of one client connection.
pub struct SignalingSession {
    connection_id: ConnectionId,
    registry: RoomRegistry,
    notifier: PeerNotifier,
    /// Rooms this connection joined and has not left.
    joined_rooms: HashSet<String>,
}

impl SignalingSession {
    #[must_use]
    pub fn new(registry: RoomRegistry, notifier: PeerNotifier) -> Self {
        Self {
            connection_id: notifier.connection_id(),
            registry,
            notifier,
            joined_rooms: HashSet::new(),
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    #[must_use]
    pub fn joined_rooms(&self) -> &HashSet<String> {
        &self.joined_rooms
    }

    /// Handle one text frame. Returns the serialized ack frame, if any.
    pub async fn handle_text(&mut self, text: &str) -> Option<String> {
        let (ack_id, reply) = match ClientFrame::parse(text) {
            Ok(frame) => (frame.ack_id, self.handle_event(frame.event).await),
            Err(invalid) => {
                warn!(
                    target: "rc.signaling",
                    connection_id = %self.connection_id,
                    error = %invalid.error,
                    "Invalid client frame"
                );
                let err = RcError::InvalidMessage(invalid.error);
                (invalid.ack_id, Some(to_value(&ErrorBody::from(&err))))
            }
        };

        let frame = AckFrame {
            ack: ack_id?,
            data: reply?,
        };
        match serde_json::to_string(&frame) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(
                    target: "rc.signaling",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Failed to encode ack"
                );
                None
            }
        }
    }

    /// Handle one decoded event. Returns the ack payload for events that have one.
    pub async fn handle_event(&mut self, event: ClientEvent) -> Option<Value> {
        let name = event.name();
        let shape = event.ack_shape();
        let room_id = event.room_id().to_string();
        let started = Instant::now();

        let result = self.dispatch(event).await;
        prom::record_signaling_event(name, result.is_ok(), started.elapsed());

        match result {
            Ok(reply) => reply,
            Err(err) => {
                self.log_failure(name, &room_id, &err);
                error_reply(shape, &err)
            }
        }
    }

    /// Leave every room this connection joined (socket closed).
    pub async fn disconnect(&mut self) {
        let rooms: Vec<String> = self.joined_rooms.drain().collect();
        for room_id in rooms {
            match self
                .registry
                .remove_peer_and_maybe_destroy_room(&room_id, self.connection_id)
                .await
            {
                Ok(outcome) => {
                    debug!(
                        target: "rc.signaling",
                        connection_id = %self.connection_id,
                        room_id = %room_id,
                        removed = outcome.removed,
                        room_closed = outcome.room_closed,
                        "Left room on disconnect"
                    );
                }
                Err(e) => {
                    warn!(
                        target: "rc.signaling",
                        connection_id = %self.connection_id,
                        room_id = %room_id,
                        error = %e,
                        "Failed to leave room on disconnect"
                    );
                }
            }
        }

        info!(
            target: "rc.signaling",
            connection_id = %self.connection_id,
            "Connection disconnected"
        );
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<Option<Value>, RcError> {
        match event {
            ClientEvent::JoinRoom { room_id } => {
                let (_room, result) = self
                    .registry
                    .join(&room_id, self.connection_id, self.notifier.clone())
                    .await?;
                self.joined_rooms.insert(room_id);
                Ok(Some(to_value(&result)))
            }

            ClientEvent::LeaveCall { room_id } => {
                self.registry
                    .remove_peer_and_maybe_destroy_room(&room_id, self.connection_id)
                    .await?;
                self.joined_rooms.remove(&room_id);
                Ok(None)
            }

            ClientEvent::CreateWebRtcTransport { sender, room_id } => {
                let room = self.room(&room_id)?;
                let params = negotiation::create_transport(
                    &room,
                    &self.registry.settings().transport_options,
                    self.connection_id,
                    TransportRole::from_sender_flag(sender),
                )
                .await?;
                Ok(Some(to_value(&Params { params })))
            }

            ClientEvent::ConnectTransport {
                room_id,
                transport_id,
                dtls_parameters,
            } => {
                let room = self.room(&room_id)?;
                negotiation::connect_transport(
                    &room,
                    self.connection_id,
                    &transport_id,
                    dtls_parameters,
                )
                .await?;
                Ok(None)
            }

            ClientEvent::ProduceTransport {
                room_id,
                transport_id,
                kind,
                app_data,
                rtp_parameters,
            } => {
                let room = self.room(&room_id)?;
                let id = negotiation::produce(
                    &room,
                    self.connection_id,
                    &transport_id,
                    kind,
                    rtp_parameters,
                    app_data,
                )
                .await?;
                Ok(Some(to_value(&ProduceResult { id })))
            }

            ClientEvent::Consume {
                room_id,
                transport_id,
                producer_id,
                rtp_capabilities,
                app_data,
            } => {
                let room = self.room(&room_id)?;
                let params = negotiation::consume(
                    &room,
                    self.connection_id,
                    &transport_id,
                    &producer_id,
                    rtp_capabilities,
                    app_data,
                )
                .await?;
                Ok(Some(to_value(&Params { params })))
            }

            ClientEvent::ResumeConsumer {
                room_id,
                consumer_id,
            } => {
                let room = self.room(&room_id)?;
                negotiation::resume_consumer(&room, self.connection_id, &consumer_id).await?;
                Ok(Some(to_value(&Params {
                    params: ResumeResult { success: true },
                })))
            }

            ClientEvent::MuteToggle {
                room_id,
                kind,
                is_muted,
                connection_id,
            } => {
                let room = self.room(&room_id)?;
                let target = connection_id.unwrap_or(self.connection_id);
                negotiation::mute_toggle(&room, self.connection_id, target, kind, is_muted)
                    .await?;
                Ok(None)
            }
        }
    }

    fn room(&self, room_id: &str) -> Result<RoomActorHandle, RcError> {
        self.registry
            .get_room(room_id)
            .ok_or_else(|| RcError::RoomNotFound(room_id.to_string()))
    }

    fn log_failure(&self, event: &'static str, room_id: &str, err: &RcError) {
        if err.is_not_found() {
            debug!(
                target: "rc.signaling",
                connection_id = %self.connection_id,
                room_id = %room_id,
                event,
                error = %err,
                "Event target not found"
            );
        } else {
            warn!(
                target: "rc.signaling",
                connection_id = %self.connection_id,
                room_id = %room_id,
                event,
                error = %err,
                error_code = err.error_code(),
                "Event failed"
            );
        }
    }
}
