//! Actor metrics and mailbox monitoring.
//!
//! Room actor mailbox thresholds:
//!
//! | Normal | Warning | Critical |
//! |--------|---------|----------|
//! | < 100  | 100-500 | > 500    |
//!
//! Counts are kept in atomics for the `/status` endpoint and mirrored into
//! Prometheus gauges (see [`crate::observability::metrics`]).

use crate::observability::metrics as prom;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mailbox depth thresholds for room actors.
pub const ROOM_MAILBOX_NORMAL: usize = 100;
pub const ROOM_MAILBOX_WARNING: usize = 500;

/// Metric label for room actors.
pub const ROOM_ACTOR_TYPE: &str = "room";

/// How backed up a room mailbox is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// At most `ROOM_MAILBOX_NORMAL` queued.
    Normal,
    /// Up to `ROOM_MAILBOX_WARNING` queued.
    Warning,
    /// More than `ROOM_MAILBOX_WARNING` queued.
    Critical,
}

impl MailboxLevel {
    fn for_depth(depth: usize) -> Self {
        match depth {
            d if d > ROOM_MAILBOX_WARNING => Self::Critical,
            d if d > ROOM_MAILBOX_NORMAL => Self::Warning,
            _ => Self::Normal,
        }
    }
}

/// Queue depth tracking for one room actor.
///
/// The handle counts enqueues and the actor counts dequeues, so the depth is
/// the number of messages waiting in the room's channel.
#[derive(Debug)]
pub struct MailboxMonitor {
    /// Log field only, never a metric label.
    room_id: String,
    depth: AtomicUsize,
    peak: AtomicUsize,
    handled: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            depth: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            handled: AtomicU64::new(0),
        }
    }

    /// A message was queued for the room.
    pub fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(depth, Ordering::Relaxed);

        match MailboxLevel::for_depth(depth) {
            MailboxLevel::Critical => warn!(
                target: "rc.actor.mailbox",
                room_id = %self.room_id,
                depth,
                threshold = ROOM_MAILBOX_WARNING,
                "Room mailbox backed up"
            ),
            // Only on the transition into Warning
            MailboxLevel::Warning if depth == ROOM_MAILBOX_NORMAL + 1 => debug!(
                target: "rc.actor.mailbox",
                room_id = %self.room_id,
                depth,
                "Room mailbox elevated"
            ),
            _ => {}
        }
    }

    /// The room actor took a message off the queue.
    pub fn record_dequeue(&self) {
        let depth = decrement(&self.depth);
        self.handled.fetch_add(1, Ordering::Relaxed);
        prom::set_actor_mailbox_depth(ROOM_ACTOR_TYPE, depth);
    }

    /// Undo an enqueue whose send failed.
    pub fn record_send_failed(&self) {
        decrement(&self.depth);
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        MailboxLevel::for_depth(self.current_depth())
    }
}

/// Registry-wide room and peer counters.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    active_rooms: AtomicUsize,
    /// Peer sessions across all rooms.
    active_peers: AtomicUsize,
    actor_panics: AtomicU64,
    /// Messages handled by every room actor since startup.
    total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn room_created(&self) {
        let rooms = self.active_rooms.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_rooms_active(rooms);
    }

    pub fn room_removed(&self) {
        let rooms = decrement(&self.active_rooms);
        prom::set_rooms_active(rooms);
    }

    pub fn peer_joined(&self) {
        let peers = self.active_peers.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_peers_active(peers);
    }

    pub fn peers_left(&self, count: usize) {
        if count > 0 {
            prom::set_peers_active(subtract(&self.active_peers, count));
        }
    }

    /// A room actor task panicked; its room is gone.
    pub fn record_panic(&self) {
        let total = self.actor_panics.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_actor_panic(ROOM_ACTOR_TYPE);
        tracing::error!(
            target: "rc.actor.panic",
            actor_type = ROOM_ACTOR_TYPE,
            total_panics = total,
            "Room actor panicked, its peers were dropped"
        );
    }

    pub fn record_message_processed(&self) {
        self.total_messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.active_rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.active_peers.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.actor_panics.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.total_messages_processed.load(Ordering::Relaxed)
    }
}

/// Saturating subtract; returns the new value.
fn subtract(counter: &AtomicUsize, amount: usize) -> usize {
    let previous = counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(amount))
        })
        .unwrap_or(0);
    previous.saturating_sub(amount)
}

fn decrement(counter: &AtomicUsize) -> usize {
    subtract(counter, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_tracks_queue_and_keeps_peak() {
        let mailbox = MailboxMonitor::new("standup");
        for _ in 0..3 {
            mailbox.record_enqueue();
        }
        mailbox.record_dequeue();
        mailbox.record_dequeue();

        assert_eq!(mailbox.current_depth(), 1);
        assert_eq!(mailbox.peak_depth(), 3);
        assert_eq!(mailbox.messages_processed(), 2);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(MailboxLevel::for_depth(0), MailboxLevel::Normal);
        assert_eq!(MailboxLevel::for_depth(ROOM_MAILBOX_NORMAL), MailboxLevel::Normal);
        assert_eq!(
            MailboxLevel::for_depth(ROOM_MAILBOX_NORMAL + 1),
            MailboxLevel::Warning
        );
        assert_eq!(MailboxLevel::for_depth(ROOM_MAILBOX_WARNING), MailboxLevel::Warning);
        assert_eq!(
            MailboxLevel::for_depth(ROOM_MAILBOX_WARNING + 1),
            MailboxLevel::Critical
        );

        let mailbox = MailboxMonitor::new("standup");
        for _ in 0..=ROOM_MAILBOX_WARNING {
            mailbox.record_enqueue();
        }
        assert_eq!(mailbox.current_level(), MailboxLevel::Critical);
    }

    #[test]
    fn test_failed_send_and_extra_dequeue_saturate() {
        let mailbox = MailboxMonitor::new("standup");
        mailbox.record_enqueue();
        mailbox.record_send_failed();
        mailbox.record_dequeue();
        assert_eq!(mailbox.current_depth(), 0);
    }

    #[test]
    fn test_room_and_peer_counters() {
        let counters = ActorMetrics::new();
        counters.room_created();
        counters.room_created();
        for _ in 0..3 {
            counters.peer_joined();
        }

        counters.peers_left(2);
        counters.room_removed();
        assert_eq!((counters.room_count(), counters.peer_count()), (1, 1));

        counters.peers_left(5);
        counters.room_removed();
        counters.room_removed();
        assert_eq!((counters.room_count(), counters.peer_count()), (0, 0));
    }

    #[test]
    fn test_panic_counter() {
        let counters = ActorMetrics::new();
        counters.record_panic();
        counters.record_panic();
        assert_eq!(counters.panic_count(), 2);
    }
}
