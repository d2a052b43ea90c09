//! `RoomActor` - per-room actor that owns room state.
//!
//! Each `RoomActor`:
//! - Owns the room's router and every peer session in it
//! - Serializes all reads/writes of the peer map and resource lists
//! - Broadcasts `newProducer`, `peerLeft` and `peerMuteChange`
//! - Closes itself (and its router) when its last peer leaves
//!
//! A repeated `joinRoom` on the same connection resets the peer: its old
//! resources are closed and the other peers get `peerLeft` for it, while the
//! peer itself stays in the room with a fresh session.
//!
//! # Two-phase operations
//!
//! Engine calls can be slow, so the actor never awaits them. Callers ask the
//! actor to validate ("prepare"/"find"), run the engine call on their own
//! task, then ask the actor to record the result ("attach"). An attach that
//! finds the peer, transport or producer gone fails with a not-found error
//! and the caller closes the engine object it just created.
//!
//! # Close watchers
//!
//! Every attached transport, producer and consumer gets a watcher task that
//! reports the engine-side close back to the actor. Watchers hold only a
//! weak sender and stop with the room's cancellation token, so they never
//! keep a room alive.

use crate::errors::RcError;
use crate::media::{AppData, CloseSignal, Consumer, Producer, Router, WebRtcTransport};

use super::messages::{
    ConsumeTicket, JoinResult, LeaveOutcome, NewProducerEvent, PeerLeftEvent,
    PeerMuteChangeEvent, RoomMessage, RoomNotification, RoomState, TransportLookup,
    TransportTicket,
};
use super::metrics::{ActorMetrics, MailboxMonitor};
use super::peer::{PeerNotifier, PeerSession};

use common::types::{ConnectionId, MediaKind, TransportRole};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Handle to a `RoomActor`.
///
/// Cheap to clone. Every request method fails with `RoomClosed` once the
/// actor has stopped.
#[derive(Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: Arc<str>,
    peer_count: Arc<AtomicUsize>,
    mailbox: Arc<MailboxMonitor>,
}

impl std::fmt::Debug for RoomActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomActorHandle")
            .field("room_id", &self.room_id)
            .field("peer_count", &self.peer_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Number of peer sessions currently in the room.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peer_count.load(Ordering::SeqCst)
    }

    /// Whether the room has closed (last peer left, cancelled, or crashed).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled() || self.sender.is_closed()
    }

    /// Whether both handles refer to the same actor instance.
    #[must_use]
    pub fn same_room(&self, other: &RoomActorHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// Wait until the actor task has dropped its mailbox.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }

    /// Cancel the room actor. It closes every peer's resources and its router.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Insert a peer session (or reset an existing one for this connection).
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        notifier: PeerNotifier,
    ) -> Result<JoinResult, RcError> {
        self.request(|respond_to| RoomMessage::Join {
            connection_id,
            notifier,
            respond_to,
        })
        .await?
    }

    /// Remove a peer session. Idempotent.
    pub async fn leave(&self, connection_id: ConnectionId) -> Result<LeaveOutcome, RcError> {
        self.request(|respond_to| RoomMessage::Leave {
            connection_id,
            respond_to,
        })
        .await
    }

    pub async fn prepare_transport(
        &self,
        connection_id: ConnectionId,
    ) -> Result<TransportTicket, RcError> {
        self.request(|respond_to| RoomMessage::PrepareTransport {
            connection_id,
            respond_to,
        })
        .await?
    }

    pub async fn attach_transport(
        &self,
        connection_id: ConnectionId,
        session: u64,
        role: TransportRole,
        transport: Arc<dyn WebRtcTransport>,
    ) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::AttachTransport {
            connection_id,
            session,
            role,
            transport,
            respond_to,
        })
        .await?
    }

    pub async fn find_transport(
        &self,
        connection_id: ConnectionId,
        transport_id: String,
        expected_role: Option<TransportRole>,
    ) -> Result<TransportLookup, RcError> {
        self.request(|respond_to| RoomMessage::FindTransport {
            connection_id,
            transport_id,
            expected_role,
            respond_to,
        })
        .await?
    }

    /// Record a completed DTLS handshake (fire-and-forget).
    pub async fn mark_transport_connected(
        &self,
        connection_id: ConnectionId,
        transport_id: String,
    ) -> Result<(), RcError> {
        self.send(RoomMessage::MarkTransportConnected {
            connection_id,
            transport_id,
        })
        .await
    }

    pub async fn attach_producer(
        &self,
        connection_id: ConnectionId,
        session: u64,
        transport_id: String,
        producer: Arc<dyn Producer>,
        app_data: AppData,
    ) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::AttachProducer {
            connection_id,
            session,
            transport_id,
            producer,
            app_data,
            respond_to,
        })
        .await?
    }

    pub async fn prepare_consume(
        &self,
        connection_id: ConnectionId,
        transport_id: String,
        producer_id: String,
        rtp_capabilities: Value,
    ) -> Result<ConsumeTicket, RcError> {
        self.request(|respond_to| RoomMessage::PrepareConsume {
            connection_id,
            transport_id,
            producer_id,
            rtp_capabilities,
            respond_to,
        })
        .await?
    }

    pub async fn attach_consumer(
        &self,
        connection_id: ConnectionId,
        session: u64,
        transport_id: String,
        consumer: Arc<dyn Consumer>,
    ) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::AttachConsumer {
            connection_id,
            session,
            transport_id,
            consumer,
            respond_to,
        })
        .await?
    }

    pub async fn find_consumer(
        &self,
        connection_id: ConnectionId,
        consumer_id: String,
    ) -> Result<Arc<dyn Consumer>, RcError> {
        self.request(|respond_to| RoomMessage::FindConsumer {
            connection_id,
            consumer_id,
            respond_to,
        })
        .await?
    }

    pub async fn mute_toggle(
        &self,
        sender: ConnectionId,
        target: ConnectionId,
        kind: MediaKind,
        is_muted: bool,
    ) -> Result<(), RcError> {
        self.request(|respond_to| RoomMessage::MuteToggle {
            sender,
            target,
            kind,
            is_muted,
            respond_to,
        })
        .await?
    }

    /// Get current room state.
    pub async fn get_state(&self) -> Result<RoomState, RcError> {
        self.request(|respond_to| RoomMessage::GetState { respond_to })
            .await
    }

    async fn send(&self, message: RoomMessage) -> Result<(), RcError> {
        self.mailbox.record_enqueue();
        if self.sender.send(message).await.is_err() {
            self.mailbox.record_send_failed();
            return Err(RcError::RoomClosed(self.room_id.to_string()));
        }
        Ok(())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomMessage,
    ) -> Result<T, RcError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;

        // The actor drops queued requests when it closes
        rx.await
            .map_err(|_| RcError::RoomClosed(self.room_id.to_string()))
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    room_id: String,
    router: Arc<dyn Router>,
    receiver: mpsc::Receiver<RoomMessage>,
    /// Weak sender handed to close watchers.
    weak_sender: mpsc::WeakSender<RoomMessage>,
    /// Cancellation token (child of the registry's root token).
    cancel_token: CancellationToken,
    peers: HashMap<ConnectionId, PeerSession>,
    /// Last issued peer session generation.
    next_session: u64,
    created_at: i64,
    /// Set once the last peer left; the run loop exits after the current message.
    closed: bool,
    peer_count: Arc<AtomicUsize>,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl RoomActor {
    /// Spawn a new room actor owning `router`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        room_id: String,
        router: Arc<dyn Router>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let peer_count = Arc::new(AtomicUsize::new(0));
        let mailbox = Arc::new(MailboxMonitor::new(room_id.clone()));

        let actor = Self {
            room_id: room_id.clone(),
            router,
            receiver,
            weak_sender: sender.downgrade(),
            cancel_token: cancel_token.clone(),
            peers: HashMap::new(),
            next_session: 0,
            created_at: chrono::Utc::now().timestamp(),
            closed: false,
            peer_count: Arc::clone(&peer_count),
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id: Arc::from(room_id),
            peer_count,
            mailbox,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "rc.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            router_id = %self.router.id(),
            "RoomActor started"
        );

        loop {
            tokio::select! {
                // Handle cancellation
                () = self.cancel_token.cancelled() => {
                    if !self.closed {
                        info!(
                            target: "rc.actor.room",
                            room_id = %self.room_id,
                            "RoomActor received cancellation signal"
                        );
                        self.shutdown();
                    }
                    break;
                }

                // Handle messages
                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                            if self.closed {
                                break;
                            }
                        }
                        None => {
                            // All handles dropped
                            self.shutdown();
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: RoomMessage) {
        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            message = message.name(),
            "Handling message"
        );

        match message {
            RoomMessage::Join {
                connection_id,
                notifier,
                respond_to,
            } => {
                let result = self.handle_join(connection_id, notifier);
                let _ = respond_to.send(result);
            }

            RoomMessage::Leave {
                connection_id,
                respond_to,
            } => {
                let outcome = self.handle_leave(connection_id);
                let _ = respond_to.send(outcome);
            }

            RoomMessage::PrepareTransport {
                connection_id,
                respond_to,
            } => {
                let result = self.peer(connection_id).map(|peer| TransportTicket {
                    router: Arc::clone(&self.router),
                    session: peer.session,
                });
                let _ = respond_to.send(result);
            }

            RoomMessage::AttachTransport {
                connection_id,
                session,
                role,
                transport,
                respond_to,
            } => {
                let result = self.handle_attach_transport(connection_id, session, role, transport);
                let _ = respond_to.send(result);
            }

            RoomMessage::FindTransport {
                connection_id,
                transport_id,
                expected_role,
                respond_to,
            } => {
                let result = self.find_transport(connection_id, &transport_id, expected_role);
                let _ = respond_to.send(result);
            }

            RoomMessage::MarkTransportConnected {
                connection_id,
                transport_id,
            } => {
                if let Some(peer) = self.peers.get_mut(&connection_id) {
                    if peer.mark_connected(&transport_id) {
                        debug!(
                            target: "rc.actor.room",
                            room_id = %self.room_id,
                            connection_id = %connection_id,
                            transport_id = %transport_id,
                            phase = ?peer.phase(),
                            "Transport connected"
                        );
                    }
                }
            }

            RoomMessage::AttachProducer {
                connection_id,
                session,
                transport_id,
                producer,
                app_data,
                respond_to,
            } => {
                let result = self.handle_attach_producer(
                    connection_id,
                    session,
                    transport_id,
                    producer,
                    app_data,
                );
                let _ = respond_to.send(result);
            }

            RoomMessage::PrepareConsume {
                connection_id,
                transport_id,
                producer_id,
                rtp_capabilities,
                respond_to,
            } => {
                let result = self.handle_prepare_consume(
                    connection_id,
                    &transport_id,
                    &producer_id,
                    &rtp_capabilities,
                );
                let _ = respond_to.send(result);
            }

            RoomMessage::AttachConsumer {
                connection_id,
                session,
                transport_id,
                consumer,
                respond_to,
            } => {
                let result =
                    self.handle_attach_consumer(connection_id, session, transport_id, consumer);
                let _ = respond_to.send(result);
            }

            RoomMessage::FindConsumer {
                connection_id,
                consumer_id,
                respond_to,
            } => {
                let result = self.peer(connection_id).and_then(|peer| {
                    peer.consumer(&consumer_id)
                        .map(|entry| Arc::clone(&entry.consumer))
                        .ok_or(RcError::ConsumerNotFound(consumer_id))
                });
                let _ = respond_to.send(result);
            }

            RoomMessage::MuteToggle {
                sender,
                target,
                kind,
                is_muted,
                respond_to,
            } => {
                let result = self.handle_mute_toggle(sender, target, kind, is_muted);
                let _ = respond_to.send(result);
            }

            RoomMessage::TransportClosed {
                connection_id,
                transport_id,
            } => {
                self.handle_transport_closed(connection_id, &transport_id);
            }

            RoomMessage::ProducerClosed {
                connection_id,
                producer_id,
            } => {
                self.handle_producer_closed(connection_id, &producer_id);
            }

            RoomMessage::ConsumerClosed {
                connection_id,
                consumer_id,
            } => {
                if let Some(peer) = self.peers.get_mut(&connection_id) {
                    if peer.remove_consumer(&consumer_id).is_some() {
                        debug!(
                            target: "rc.actor.room",
                            room_id = %self.room_id,
                            connection_id = %connection_id,
                            consumer_id = %consumer_id,
                            "Consumer closed by engine"
                        );
                    }
                }
            }

            RoomMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }
        }
    }

    fn peer(&self, connection_id: ConnectionId) -> Result<&PeerSession, RcError> {
        self.peers
            .get(&connection_id)
            .ok_or(RcError::PeerNotFound(connection_id))
    }

    /// Look up a peer, requiring the session generation to match.
    fn current_peer_mut(
        &mut self,
        connection_id: ConnectionId,
        session: u64,
    ) -> Result<&mut PeerSession, RcError> {
        match self.peers.get_mut(&connection_id) {
            Some(peer) if peer.session == session => Ok(peer),
            _ => Err(RcError::PeerNotFound(connection_id)),
        }
    }

    fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        notifier: PeerNotifier,
    ) -> Result<JoinResult, RcError> {
        let rejoined = match self.peers.remove(&connection_id) {
            Some(mut previous) => {
                let producer_ids = previous.close_all();
                self.close_consumers_of(&producer_ids);
                // Other clients drop the old session's tiles; the new
                // session's producers arrive as `newProducer` again
                self.broadcast(
                    Some(connection_id),
                    &RoomNotification::PeerLeft(PeerLeftEvent { connection_id }),
                );
                info!(
                    target: "rc.actor.room",
                    room_id = %self.room_id,
                    connection_id = %connection_id,
                    producers_closed = producer_ids.len(),
                    "Repeated join, peer session reset"
                );
                true
            }
            None => false,
        };

        self.next_session += 1;
        self.peers.insert(
            connection_id,
            PeerSession::new(connection_id, self.next_session, notifier),
        );

        if !rejoined {
            self.peer_count.store(self.peers.len(), Ordering::SeqCst);
            self.metrics.peer_joined();
        }

        // Snapshot inside the actor: any producer attached later is delivered
        // to this peer as a `newProducer` notification instead.
        let existing_producers = self
            .peers
            .values()
            .filter(|peer| peer.connection_id != connection_id)
            .flat_map(PeerSession::producer_infos)
            .collect::<Vec<_>>();

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            peer_count = self.peers.len(),
            existing_producers = existing_producers.len(),
            "Peer joined"
        );

        Ok(JoinResult {
            rtp_capabilities: self.router.rtp_capabilities(),
            existing_producers,
        })
    }

    fn handle_leave(&mut self, connection_id: ConnectionId) -> LeaveOutcome {
        let Some(mut peer) = self.peers.remove(&connection_id) else {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                "Leave for unknown peer ignored"
            );
            return LeaveOutcome::default();
        };

        let producer_ids = peer.close_all();
        let consumers_closed = self.close_consumers_of(&producer_ids);

        self.peer_count.store(self.peers.len(), Ordering::SeqCst);
        self.metrics.peers_left(1);

        self.broadcast(
            Some(connection_id),
            &RoomNotification::PeerLeft(PeerLeftEvent { connection_id }),
        );

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            producers_closed = producer_ids.len(),
            remote_consumers_closed = consumers_closed,
            peer_count = self.peers.len(),
            "Peer left"
        );

        let room_closed = self.peers.is_empty();
        if room_closed {
            self.close_room();
        }

        LeaveOutcome {
            removed: true,
            room_closed,
        }
    }

    fn handle_attach_transport(
        &mut self,
        connection_id: ConnectionId,
        session: u64,
        role: TransportRole,
        transport: Arc<dyn WebRtcTransport>,
    ) -> Result<(), RcError> {
        let transport_id = transport.id().to_string();
        let signal = transport.closed();

        let peer = self.current_peer_mut(connection_id, session)?;
        peer.add_transport(transport, role);
        let phase = peer.phase();

        self.watch_close(
            signal,
            RoomMessage::TransportClosed {
                connection_id,
                transport_id: transport_id.clone(),
            },
        );

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            transport_id = %transport_id,
            role = %role,
            phase = ?phase,
            "Transport attached"
        );
        Ok(())
    }

    fn find_transport(
        &self,
        connection_id: ConnectionId,
        transport_id: &str,
        expected_role: Option<TransportRole>,
    ) -> Result<TransportLookup, RcError> {
        let peer = self.peer(connection_id)?;
        let entry = peer
            .transport(transport_id)
            .ok_or_else(|| RcError::TransportNotFound(transport_id.to_string()))?;

        if let Some(expected) = expected_role {
            if entry.role != expected {
                return Err(RcError::TransportRoleMismatch {
                    transport_id: transport_id.to_string(),
                    expected,
                    actual: entry.role,
                });
            }
        }

        Ok(TransportLookup {
            transport: Arc::clone(&entry.transport),
            role: entry.role,
            session: peer.session,
        })
    }

    fn handle_attach_producer(
        &mut self,
        connection_id: ConnectionId,
        session: u64,
        transport_id: String,
        producer: Arc<dyn Producer>,
        app_data: AppData,
    ) -> Result<(), RcError> {
        let producer_id = producer.id().to_string();
        let kind = producer.kind();
        let signal = producer.closed();

        let peer = self.current_peer_mut(connection_id, session)?;
        match peer.transport(&transport_id) {
            Some(entry) if entry.role == TransportRole::Producer => {}
            Some(entry) => {
                return Err(RcError::TransportRoleMismatch {
                    transport_id,
                    expected: TransportRole::Producer,
                    actual: entry.role,
                })
            }
            None => return Err(RcError::TransportNotFound(transport_id)),
        }
        peer.add_producer(producer, transport_id, app_data.clone());

        self.watch_close(
            signal,
            RoomMessage::ProducerClosed {
                connection_id,
                producer_id: producer_id.clone(),
            },
        );

        let delivered = self.broadcast(
            Some(connection_id),
            &RoomNotification::NewProducer(NewProducerEvent {
                producer_id: producer_id.clone(),
                kind,
                app_data,
                connection_id,
            }),
        );

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            producer_id = %producer_id,
            kind = %kind,
            notified_peers = delivered,
            "Producer attached"
        );
        Ok(())
    }

    fn handle_prepare_consume(
        &self,
        connection_id: ConnectionId,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: &Value,
    ) -> Result<ConsumeTicket, RcError> {
        let lookup = self.find_transport(connection_id, transport_id, Some(TransportRole::Consumer))?;

        let (kind, producer_app_data) = self
            .peers
            .values()
            .find_map(|peer| peer.producer(producer_id))
            .map(|entry| (entry.producer.kind(), entry.app_data.clone()))
            .ok_or_else(|| RcError::ProducerNotFound(producer_id.to_string()))?;

        if !self.router.can_consume(producer_id, rtp_capabilities) {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                connection_id = %connection_id,
                producer_id = %producer_id,
                "Router cannot consume producer with given capabilities"
            );
            return Err(RcError::IncapableConsume {
                producer_id: producer_id.to_string(),
            });
        }

        Ok(ConsumeTicket {
            transport: lookup.transport,
            session: lookup.session,
            kind,
            producer_app_data,
        })
    }

    fn handle_attach_consumer(
        &mut self,
        connection_id: ConnectionId,
        session: u64,
        transport_id: String,
        consumer: Arc<dyn Consumer>,
    ) -> Result<(), RcError> {
        let consumer_id = consumer.id().to_string();
        let producer_id = consumer.producer_id().to_string();
        let signal = consumer.closed();

        let producer_alive = self
            .peers
            .values()
            .any(|peer| peer.producer(&producer_id).is_some());

        let peer = self.current_peer_mut(connection_id, session)?;
        if peer.transport(&transport_id).is_none() {
            return Err(RcError::TransportNotFound(transport_id));
        }
        if !producer_alive {
            return Err(RcError::ProducerNotFound(producer_id));
        }
        peer.add_consumer(consumer, transport_id);

        self.watch_close(
            signal,
            RoomMessage::ConsumerClosed {
                connection_id,
                consumer_id: consumer_id.clone(),
            },
        );

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            consumer_id = %consumer_id,
            producer_id = %producer_id,
            "Consumer attached"
        );
        Ok(())
    }

    fn handle_mute_toggle(
        &mut self,
        sender: ConnectionId,
        target: ConnectionId,
        kind: MediaKind,
        is_muted: bool,
    ) -> Result<(), RcError> {
        self.peer(sender)?;
        let peer = self
            .peers
            .get_mut(&target)
            .ok_or(RcError::PeerNotFound(target))?;

        let mut flagged = 0;
        for entry in peer.producers_of_kind_mut(kind) {
            entry
                .app_data
                .insert(kind.mute_flag_key().to_string(), Value::Bool(is_muted));
            flagged += 1;
        }
        if flagged == 0 {
            debug!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                target = %target,
                kind = %kind,
                "No producer to flag, broadcasting mute change only"
            );
        }

        self.broadcast(
            Some(sender),
            &RoomNotification::PeerMuteChange(PeerMuteChangeEvent {
                kind,
                is_muted,
                connection_id: target,
            }),
        );
        Ok(())
    }

    fn handle_transport_closed(&mut self, connection_id: ConnectionId, transport_id: &str) {
        let Some(peer) = self.peers.get_mut(&connection_id) else {
            return;
        };
        if peer.remove_transport(transport_id).is_none() {
            return;
        }

        // Engines cascade transport closes; drop the bookkeeping eagerly so
        // the peer never lists resources on a dead transport.
        let producer_ids: HashSet<String> = peer
            .remove_producers_on(transport_id)
            .into_iter()
            .map(|entry| {
                entry.producer.close();
                entry.producer.id().to_string()
            })
            .collect();
        for entry in peer.remove_consumers_on(transport_id) {
            entry.consumer.close();
        }
        self.close_consumers_of(&producer_ids);

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            transport_id = %transport_id,
            producers_closed = producer_ids.len(),
            "Transport closed by engine"
        );
    }

    fn handle_producer_closed(&mut self, connection_id: ConnectionId, producer_id: &str) {
        let removed = self
            .peers
            .get_mut(&connection_id)
            .and_then(|peer| peer.remove_producer(producer_id))
            .is_some();
        if !removed {
            return;
        }

        let producer_ids = HashSet::from([producer_id.to_string()]);
        let consumers_closed = self.close_consumers_of(&producer_ids);

        debug!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            connection_id = %connection_id,
            producer_id = %producer_id,
            consumers_closed,
            "Producer closed by engine"
        );
    }

    /// Close every consumer (in any peer) of the given producers.
    fn close_consumers_of(&mut self, producer_ids: &HashSet<String>) -> usize {
        if producer_ids.is_empty() {
            return 0;
        }
        self.peers
            .values_mut()
            .map(|peer| peer.close_consumers_of(producer_ids))
            .sum()
    }

    /// Queue a notification for every peer except `except`.
    fn broadcast(&self, except: Option<ConnectionId>, notification: &RoomNotification) -> usize {
        self.peers
            .values()
            .filter(|peer| Some(peer.connection_id) != except)
            .filter(|peer| peer.notifier.notify(notification.clone()))
            .count()
    }

    fn watch_close(&self, signal: CloseSignal, message: RoomMessage) {
        let weak_sender = self.weak_sender.clone();
        let cancel_token = self.cancel_token.clone();
        let mailbox = Arc::clone(&self.mailbox);

        tokio::spawn(async move {
            tokio::select! {
                () = signal.closed() => {
                    if let Some(sender) = weak_sender.upgrade() {
                        mailbox.record_enqueue();
                        if sender.send(message).await.is_err() {
                            mailbox.record_send_failed();
                        }
                    }
                }
                () = cancel_token.cancelled() => {}
            }
        });
    }

    /// Last peer left: release the router and stop.
    fn close_room(&mut self) {
        self.closed = true;
        self.router.close();
        // Makes `RoomActorHandle::is_closed` true before the leave is answered
        self.cancel_token.cancel();

        info!(
            target: "rc.actor.room",
            room_id = %self.room_id,
            "Room empty, router closed"
        );
    }

    /// Cancelled (registry shutdown): close every peer's resources and the router.
    fn shutdown(&mut self) {
        let peer_count = self.peers.len();
        for (_, mut peer) in self.peers.drain() {
            let _ = peer.close_all();
        }
        self.peer_count.store(0, Ordering::SeqCst);
        self.metrics.peers_left(peer_count);
        self.router.close();
        self.closed = true;

        if peer_count > 0 {
            warn!(
                target: "rc.actor.room",
                room_id = %self.room_id,
                peers_closed = peer_count,
                "Room shut down with peers present"
            );
        }
    }

    fn state(&self) -> RoomState {
        RoomState {
            room_id: self.room_id.clone(),
            router_id: self.router.id().to_string(),
            created_at: self.created_at,
            peers: self.peers.values().map(PeerSession::state).collect(),
        }
    }
}
