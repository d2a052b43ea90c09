//! Per-connection state inside a room.
//!
//! A `PeerSession` is owned exclusively by its `RoomActor`; the transports,
//! producers and consumers it lists are owned by the session and closed
//! when it is destroyed. Lists keep creation order but are always searched
//! by id.

use crate::media::{AppData, Consumer, Producer, WebRtcTransport};
use crate::observability::metrics as prom;

use super::messages::{PeerPhase, PeerState, ProducerInfo, RoomNotification};

use common::types::{ConnectionId, MediaKind, TransportRole};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Bounded outbound queue for room broadcasts to one connection.
///
/// Delivery is at-most-once: when the queue is full the notification is
/// dropped and counted.
#[derive(Debug, Clone)]
pub struct PeerNotifier {
    connection_id: ConnectionId,
    sender: mpsc::Sender<RoomNotification>,
}

impl PeerNotifier {
    /// Create a notifier and the receiving end drained by the socket writer.
    #[must_use]
    pub fn channel(
        connection_id: ConnectionId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<RoomNotification>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                connection_id,
                sender,
            },
            receiver,
        )
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue a notification without waiting. Returns whether it was queued.
    pub fn notify(&self, notification: RoomNotification) -> bool {
        match self.sender.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(notification)) => {
                prom::record_notification_dropped(notification.event_name());
                warn!(
                    target: "rc.actor.room",
                    connection_id = %self.connection_id,
                    event = notification.event_name(),
                    "Notification queue full, dropping notification"
                );
                false
            }
            Err(TrySendError::Closed(notification)) => {
                debug!(
                    target: "rc.actor.room",
                    connection_id = %self.connection_id,
                    event = notification.event_name(),
                    "Connection gone, notification discarded"
                );
                false
            }
        }
    }
}

pub(crate) struct TransportEntry {
    pub transport: Arc<dyn WebRtcTransport>,
    pub role: TransportRole,
    pub connected: bool,
}

pub(crate) struct ProducerEntry {
    pub producer: Arc<dyn Producer>,
    pub transport_id: String,
    pub app_data: AppData,
}

pub(crate) struct ConsumerEntry {
    pub consumer: Arc<dyn Consumer>,
    pub transport_id: String,
}

/// Signaling state of one connection within one room.
pub(crate) struct PeerSession {
    pub connection_id: ConnectionId,
    /// Generation of this session; a repeated join starts a new one.
    pub session: u64,
    pub notifier: PeerNotifier,
    transports: Vec<TransportEntry>,
    producers: Vec<ProducerEntry>,
    consumers: Vec<ConsumerEntry>,
}

impl PeerSession {
    pub fn new(connection_id: ConnectionId, session: u64, notifier: PeerNotifier) -> Self {
        Self {
            connection_id,
            session,
            notifier,
            transports: Vec::new(),
            producers: Vec::new(),
            consumers: Vec::new(),
        }
    }

    pub fn phase(&self) -> PeerPhase {
        if self.transports.is_empty() {
            PeerPhase::Joined
        } else if self.transports.iter().all(|t| t.connected) {
            PeerPhase::Active
        } else {
            PeerPhase::Negotiating
        }
    }

    // --- transports ---

    pub fn transport(&self, transport_id: &str) -> Option<&TransportEntry> {
        self.transports
            .iter()
            .find(|t| t.transport.id() == transport_id)
    }

    pub fn add_transport(&mut self, transport: Arc<dyn WebRtcTransport>, role: TransportRole) {
        self.transports.push(TransportEntry {
            transport,
            role,
            connected: false,
        });
    }

    pub fn mark_connected(&mut self, transport_id: &str) -> bool {
        match self
            .transports
            .iter_mut()
            .find(|t| t.transport.id() == transport_id)
        {
            Some(entry) => {
                entry.connected = true;
                true
            }
            None => false,
        }
    }

    pub fn remove_transport(&mut self, transport_id: &str) -> Option<TransportEntry> {
        let index = self
            .transports
            .iter()
            .position(|t| t.transport.id() == transport_id)?;
        Some(self.transports.remove(index))
    }

    // --- producers ---

    pub fn add_producer(
        &mut self,
        producer: Arc<dyn Producer>,
        transport_id: String,
        app_data: AppData,
    ) {
        self.producers.push(ProducerEntry {
            producer,
            transport_id,
            app_data,
        });
    }

    pub fn producer(&self, producer_id: &str) -> Option<&ProducerEntry> {
        self.producers.iter().find(|p| p.producer.id() == producer_id)
    }

    /// Every producer of `kind` (e.g. camera and screen share for video).
    pub fn producers_of_kind_mut(
        &mut self,
        kind: MediaKind,
    ) -> impl Iterator<Item = &mut ProducerEntry> {
        self.producers
            .iter_mut()
            .filter(move |p| p.producer.kind() == kind)
    }

    pub fn remove_producer(&mut self, producer_id: &str) -> Option<ProducerEntry> {
        let index = self
            .producers
            .iter()
            .position(|p| p.producer.id() == producer_id)?;
        Some(self.producers.remove(index))
    }

    /// Remove every producer sent over `transport_id`.
    pub fn remove_producers_on(&mut self, transport_id: &str) -> Vec<ProducerEntry> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.producers)
            .into_iter()
            .partition(|p| p.transport_id == transport_id);
        self.producers = kept;
        removed
    }

    pub fn producer_infos(&self) -> Vec<ProducerInfo> {
        self.producers
            .iter()
            .map(|p| ProducerInfo {
                producer_id: p.producer.id().to_string(),
                kind: p.producer.kind(),
                connection_id: self.connection_id,
                app_data: p.app_data.clone(),
            })
            .collect()
    }

    // --- consumers ---

    pub fn add_consumer(&mut self, consumer: Arc<dyn Consumer>, transport_id: String) {
        self.consumers.push(ConsumerEntry {
            consumer,
            transport_id,
        });
    }

    pub fn consumer(&self, consumer_id: &str) -> Option<&ConsumerEntry> {
        self.consumers.iter().find(|c| c.consumer.id() == consumer_id)
    }

    pub fn remove_consumer(&mut self, consumer_id: &str) -> Option<ConsumerEntry> {
        let index = self
            .consumers
            .iter()
            .position(|c| c.consumer.id() == consumer_id)?;
        Some(self.consumers.remove(index))
    }

    /// Remove every consumer received over `transport_id`.
    pub fn remove_consumers_on(&mut self, transport_id: &str) -> Vec<ConsumerEntry> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.consumers)
            .into_iter()
            .partition(|c| c.transport_id == transport_id);
        self.consumers = kept;
        removed
    }

    /// Remove and close every consumer of the given producers.
    pub fn close_consumers_of(&mut self, producer_ids: &HashSet<String>) -> usize {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.consumers)
            .into_iter()
            .partition(|c| producer_ids.contains(c.consumer.producer_id()));
        self.consumers = kept;
        for entry in &removed {
            entry.consumer.close();
        }
        removed.len()
    }

    /// Close every owned resource (consumers, then producers, then
    /// transports) and empty the lists.
    ///
    /// Returns the ids of the producers that were closed so the room can
    /// close other peers' consumers of them.
    pub fn close_all(&mut self) -> HashSet<String> {
        for entry in self.consumers.drain(..) {
            entry.consumer.close();
        }

        let producer_ids = self
            .producers
            .drain(..)
            .map(|entry| {
                entry.producer.close();
                entry.producer.id().to_string()
            })
            .collect();

        for entry in self.transports.drain(..) {
            entry.transport.close();
        }

        producer_ids
    }

    pub fn state(&self) -> PeerState {
        PeerState {
            connection_id: self.connection_id,
            phase: self.phase(),
            transport_ids: self
                .transports
                .iter()
                .map(|t| t.transport.id().to_string())
                .collect(),
            producer_ids: self
                .producers
                .iter()
                .map(|p| p.producer.id().to_string())
                .collect(),
            consumer_ids: self
                .consumers
                .iter()
                .map(|c| c.consumer.id().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::messages::PeerLeftEvent;

    fn peer_left() -> RoomNotification {
        RoomNotification::PeerLeft(PeerLeftEvent {
            connection_id: ConnectionId::new(),
        })
    }

    #[tokio::test]
    async fn test_notifier_delivers_in_order() {
        let (notifier, mut rx) = PeerNotifier::channel(ConnectionId::new(), 4);

        let first = peer_left();
        let second = peer_left();
        assert!(notifier.notify(first.clone()));
        assert!(notifier.notify(second.clone()));

        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(rx.recv().await.unwrap(), second);
    }

    #[test]
    fn test_notifier_drops_when_full() {
        let (notifier, _rx) = PeerNotifier::channel(ConnectionId::new(), 2);

        assert!(notifier.notify(peer_left()));
        assert!(notifier.notify(peer_left()));
        assert!(!notifier.notify(peer_left()), "third notification should be dropped");
    }

    #[test]
    fn test_notifier_discards_when_receiver_gone() {
        let (notifier, rx) = PeerNotifier::channel(ConnectionId::new(), 2);
        drop(rx);
        assert!(!notifier.notify(peer_left()));
    }

    #[test]
    fn test_empty_session_is_joined() {
        let connection_id = ConnectionId::new();
        let (notifier, _rx) = PeerNotifier::channel(connection_id, 1);
        let session = PeerSession::new(connection_id, 1, notifier);

        assert_eq!(session.phase(), PeerPhase::Joined);
        let state = session.state();
        assert_eq!(state.connection_id, connection_id);
        assert!(state.transport_ids.is_empty());
        assert!(state.producer_ids.is_empty());
        assert!(state.consumer_ids.is_empty());
    }
}
