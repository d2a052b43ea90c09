//! Scripted signaling client.
//!
//! `TestPeer` drives a `SignalingSession` directly with the same JSON text
//! frames a browser would send over the socket, so tests exercise framing,
//! dispatch and ack shapes without a network.

use anyhow::{anyhow, bail, Context, Result};
use common::types::{ConnectionId, MediaKind};
use rc_service::actors::{PeerNotifier, RoomNotification, RoomRegistry};
use rc_service::signaling::{AckFrame, SignalingSession};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::fixtures;

/// How long `next_event` waits for a broadcast.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// One simulated client connection.
pub struct TestPeer {
    session: SignalingSession,
    notifications: mpsc::Receiver<RoomNotification>,
    next_ack: u64,
}

impl TestPeer {
    /// Connect a peer using the registry's notification buffer size.
    #[must_use]
    pub fn new(registry: &RoomRegistry) -> Self {
        Self::with_buffer(registry, registry.settings().notification_buffer)
    }

    /// Connect a peer with a specific notification queue capacity.
    #[must_use]
    pub fn with_buffer(registry: &RoomRegistry, capacity: usize) -> Self {
        let (notifier, notifications) = PeerNotifier::channel(ConnectionId::new(), capacity);
        Self {
            session: SignalingSession::new(registry.clone(), notifier),
            notifications,
            next_ack: 0,
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.session.connection_id()
    }

    #[must_use]
    pub fn session(&self) -> &SignalingSession {
        &self.session
    }

    /// Send a raw text frame and return the raw reply.
    pub async fn send_text(&mut self, text: &str) -> Option<String> {
        self.session.handle_text(text).await
    }

    /// Send an event without an ack id.
    pub async fn send(&mut self, event: &str, data: Value) {
        let frame = json!({"event": event, "data": data}).to_string();
        let _ = self.session.handle_text(&frame).await;
    }

    /// Send an event with an ack id and return the ack payload.
    ///
    /// # Errors
    ///
    /// Fails when no ack comes back or the ack id does not match.
    pub async fn request(&mut self, event: &str, data: Value) -> Result<Value> {
        self.next_ack += 1;
        let ack_id = self.next_ack;
        let frame = json!({"event": event, "data": data, "ackId": ack_id}).to_string();

        let reply = self
            .session
            .handle_text(&frame)
            .await
            .ok_or_else(|| anyhow!("no ack for {event}"))?;
        let ack: AckFrame =
            serde_json::from_str(&reply).with_context(|| format!("bad ack frame: {reply}"))?;
        if ack.ack != ack_id {
            bail!("ack id mismatch: sent {ack_id}, got {}", ack.ack);
        }
        Ok(ack.data)
    }

    /// Wait for the next room broadcast.
    ///
    /// # Errors
    ///
    /// Fails on timeout or when the queue is closed.
    pub async fn next_event(&mut self) -> Result<RoomNotification> {
        tokio::time::timeout(EVENT_TIMEOUT, self.notifications.recv())
            .await
            .context("timed out waiting for notification")?
            .ok_or_else(|| anyhow!("notification queue closed"))
    }

    /// The next queued broadcast, if one is already there.
    pub fn try_next_event(&mut self) -> Option<RoomNotification> {
        self.notifications.try_recv().ok()
    }

    /// Take every queued broadcast.
    pub fn drain_events(&mut self) -> Vec<RoomNotification> {
        std::iter::from_fn(|| self.notifications.try_recv().ok()).collect()
    }

    /// `joinRoom`; returns the ack payload (`rtpCapabilities`, `existingProducers`).
    ///
    /// # Errors
    ///
    /// Fails when the server replies with an error body.
    pub async fn join(&mut self, room_id: &str) -> Result<Value> {
        let reply = self.request("joinRoom", json!({"roomId": room_id})).await?;
        ensure_ok(&reply)?;
        Ok(reply)
    }

    /// `createWebRtcTransport`; returns the transport id.
    ///
    /// # Errors
    ///
    /// Fails when the server replies with an error body.
    pub async fn create_transport(&mut self, room_id: &str, sender: bool) -> Result<String> {
        let reply = self
            .request(
                "createWebRtcTransport",
                json!({"roomId": room_id, "sender": sender}),
            )
            .await?;
        let params = &reply["params"];
        ensure_ok(params)?;
        string_field(params, "id")
    }

    /// `connectTransport` with fixture DTLS parameters.
    pub async fn connect_transport(&mut self, room_id: &str, transport_id: &str) {
        self.send(
            "connectTransport",
            json!({
                "roomId": room_id,
                "transportId": transport_id,
                "dtlsParameters": fixtures::dtls_parameters(),
            }),
        )
        .await;
    }

    /// `produceTransport`; returns the producer id.
    ///
    /// # Errors
    ///
    /// Fails when the server replies with an error body.
    pub async fn produce(
        &mut self,
        room_id: &str,
        transport_id: &str,
        kind: MediaKind,
    ) -> Result<String> {
        let rtp_parameters = match kind {
            MediaKind::Audio => fixtures::audio_rtp_parameters(),
            MediaKind::Video => fixtures::video_rtp_parameters(),
        };
        let reply = self
            .request(
                "produceTransport",
                json!({
                    "roomId": room_id,
                    "transportId": transport_id,
                    "kind": kind,
                    "rtpParameters": rtp_parameters,
                    "appData": {"source": kind.as_str()},
                }),
            )
            .await?;
        ensure_ok(&reply)?;
        string_field(&reply, "id")
    }

    /// `consume` with capable client capabilities; returns the raw ack payload.
    ///
    /// # Errors
    ///
    /// Fails only when no ack arrives; error bodies are returned as-is.
    pub async fn consume_raw(
        &mut self,
        room_id: &str,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: Value,
    ) -> Result<Value> {
        self.request(
            "consume",
            json!({
                "roomId": room_id,
                "transportId": transport_id,
                "producerId": producer_id,
                "rtpCapabilities": rtp_capabilities,
            }),
        )
        .await
    }

    /// `consume`; returns the consumer params.
    ///
    /// # Errors
    ///
    /// Fails when the server replies with an error body.
    pub async fn consume(
        &mut self,
        room_id: &str,
        transport_id: &str,
        producer_id: &str,
    ) -> Result<Value> {
        let reply = self
            .consume_raw(
                room_id,
                transport_id,
                producer_id,
                fixtures::client_rtp_capabilities(),
            )
            .await?;
        let params = reply["params"].clone();
        ensure_ok(&params)?;
        Ok(params)
    }

    /// `resumeConsumer`; returns the `success` flag.
    ///
    /// # Errors
    ///
    /// Fails when the ack is not `{params: {success}}`.
    pub async fn resume(&mut self, room_id: &str, consumer_id: &str) -> Result<bool> {
        let reply = self
            .request(
                "resumeConsumer",
                json!({"roomId": room_id, "consumerId": consumer_id}),
            )
            .await?;
        reply["params"]["success"]
            .as_bool()
            .ok_or_else(|| anyhow!("unexpected resume ack: {reply}"))
    }

    /// `muteToggle`, optionally targeting another peer.
    pub async fn mute(
        &mut self,
        room_id: &str,
        kind: MediaKind,
        is_muted: bool,
        target: Option<ConnectionId>,
    ) {
        let mut data = json!({"roomId": room_id, "type": kind, "isMuted": is_muted});
        if let Some(target) = target {
            data["connectionId"] = json!(target);
        }
        self.send("muteToggle", data).await;
    }

    /// `leaveCall`.
    pub async fn leave(&mut self, room_id: &str) {
        self.send("leaveCall", json!({"roomId": room_id})).await;
    }

    /// Socket closed.
    pub async fn disconnect(&mut self) {
        self.session.disconnect().await;
    }

    /// Join, then create and connect both transports.
    ///
    /// Returns `(send_transport_id, recv_transport_id)`.
    ///
    /// # Errors
    ///
    /// Fails when any step is rejected.
    pub async fn join_with_transports(&mut self, room_id: &str) -> Result<(String, String)> {
        self.join(room_id).await?;
        let send = self.create_transport(room_id, true).await?;
        self.connect_transport(room_id, &send).await;
        let recv = self.create_transport(room_id, false).await?;
        self.connect_transport(room_id, &recv).await;
        Ok((send, recv))
    }
}

fn ensure_ok(reply: &Value) -> Result<()> {
    if let Some(error) = reply.get("error") {
        bail!("server error (code {}): {error}", reply["code"]);
    }
    Ok(())
}

fn string_field(reply: &Value, field: &str) -> Result<String> {
    reply
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing {field} in {reply}"))
}
