//! Process-wide room registry.
//!
//! Maps room ids to live room actors. Rooms are created on first join and
//! removed when their last peer leaves (or their actor dies).
//!
//! Router creation is awaited outside any map lock; if two joins race to
//! create the same room, the loser closes its surplus router and uses the
//! winner's room. A handle whose room has closed is never returned: callers
//! that lose that race see `RoomClosed` from the actor and retry.

use crate::config::{Config, DEFAULT_NOTIFICATION_BUFFER};
use crate::errors::RcError;
use crate::media::{
    media_codecs, MediaEngine, Router, RtpCodecCapability, WebRtcTransportOptions,
    DEFAULT_VIDEO_START_BITRATE,
};
use crate::observability::metrics as prom;

use super::messages::{JoinResult, LeaveOutcome};
use super::metrics::ActorMetrics;
use super::peer::PeerNotifier;
use super::room::{RoomActor, RoomActorHandle};

use common::types::ConnectionId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Join attempts before giving up on a room that keeps closing underneath us.
const JOIN_ATTEMPTS: usize = 3;

/// How long shutdown waits for each room actor to stop.
const ROOM_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-room settings shared by every room the registry creates.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Codecs every router is created with.
    pub codecs: Vec<RtpCodecCapability>,
    /// Options for every WebRTC transport.
    pub transport_options: WebRtcTransportOptions,
    /// Capacity of each connection's notification queue.
    pub notification_buffer: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            codecs: media_codecs(DEFAULT_VIDEO_START_BITRATE),
            transport_options: WebRtcTransportOptions::default(),
            notification_buffer: DEFAULT_NOTIFICATION_BUFFER,
        }
    }
}

impl RoomSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            codecs: media_codecs(config.video_start_bitrate),
            transport_options: config.transport_options(),
            notification_buffer: config.notification_buffer,
        }
    }
}

/// Room and peer counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStatus {
    pub rooms: usize,
    pub peers: usize,
}

struct RegistryInner {
    rooms: DashMap<String, RoomActorHandle>,
    engine: Arc<dyn MediaEngine>,
    settings: RoomSettings,
    /// Parent of every room's cancellation token.
    root_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    draining: AtomicBool,
}

impl RegistryInner {
    /// Remove `room_id` only if it still maps to `handle`'s actor.
    fn forget(&self, room_id: &str, handle: &RoomActorHandle) -> bool {
        let removed = self
            .rooms
            .remove_if(room_id, |_, current| current.same_room(handle))
            .is_some();
        if removed {
            self.metrics.room_removed();
            debug!(
                target: "rc.registry",
                room_id = %room_id,
                rooms = self.rooms.len(),
                "Room removed from registry"
            );
        }
        removed
    }
}

/// Registry of live rooms. Cheap to clone.
#[derive(Clone)]
pub struct RoomRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.inner.rooms.len())
            .field("draining", &self.is_draining())
            .finish_non_exhaustive()
    }
}

impl RoomRegistry {
    #[must_use]
    pub fn new(engine: Arc<dyn MediaEngine>, settings: RoomSettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                rooms: DashMap::new(),
                engine,
                settings,
                root_token: CancellationToken::new(),
                metrics: ActorMetrics::new(),
                draining: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &RoomSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<ActorMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Look up a live room.
    #[must_use]
    pub fn get_room(&self, room_id: &str) -> Option<RoomActorHandle> {
        self.inner
            .rooms
            .get(room_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Return the live room for `room_id`, creating it (and its router) if needed.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` for an empty room id
    /// - `Draining` once shutdown has started
    /// - `EngineUnavailable` if the engine cannot allocate a router
    pub async fn ensure_room(&self, room_id: &str) -> Result<RoomActorHandle, RcError> {
        if room_id.is_empty() {
            return Err(RcError::InvalidMessage("roomId must not be empty".to_string()));
        }

        if let Some(handle) = self.get_room(room_id) {
            return Ok(handle);
        }

        if self.is_draining() {
            return Err(RcError::Draining);
        }

        let router = self
            .inner
            .engine
            .create_router(&self.inner.settings.codecs)
            .await
            .map_err(|e| {
                prom::record_engine_error("create_router");
                warn!(
                    target: "rc.registry",
                    room_id = %room_id,
                    error = %e,
                    "Failed to create router"
                );
                RcError::EngineUnavailable(e.to_string())
            })?;

        if self.is_draining() {
            router.close();
            return Err(RcError::Draining);
        }

        let handle = match self.inner.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_closed() {
                    // Lost the creation race
                    debug!(
                        target: "rc.registry",
                        room_id = %room_id,
                        "Room created concurrently, closing surplus router"
                    );
                    router.close();
                    return Ok(entry.get().clone());
                }

                // Stale entry whose supervisor has not removed it yet. The
                // old supervisor's removal will not match the new actor, so
                // the room count is unchanged.
                let handle = self.spawn_room(room_id, router);
                entry.insert(handle.clone());
                handle
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn_room(room_id, router);
                entry.insert(handle.clone());
                self.inner.metrics.room_created();
                handle
            }
        };

        info!(
            target: "rc.registry",
            room_id = %room_id,
            rooms = self.inner.rooms.len(),
            "Room created"
        );

        Ok(handle)
    }

    /// Join `connection_id` to `room_id`, creating the room if needed.
    ///
    /// Retries when the room closes between lookup and join.
    pub async fn join(
        &self,
        room_id: &str,
        connection_id: ConnectionId,
        notifier: PeerNotifier,
    ) -> Result<(RoomActorHandle, JoinResult), RcError> {
        for attempt in 1..=JOIN_ATTEMPTS {
            let handle = self.ensure_room(room_id).await?;
            match handle.join(connection_id, notifier.clone()).await {
                Ok(result) => return Ok((handle, result)),
                Err(RcError::RoomClosed(_)) => {
                    debug!(
                        target: "rc.registry",
                        room_id = %room_id,
                        connection_id = %connection_id,
                        attempt,
                        "Room closed during join, retrying"
                    );
                    self.inner.forget(room_id, &handle);
                }
                Err(e) => return Err(e),
            }
        }

        Err(RcError::RoomClosed(room_id.to_string()))
    }

    /// Remove a peer from a room, destroying the room if it became empty.
    ///
    /// Idempotent: unknown rooms and peers yield an empty outcome.
    pub async fn remove_peer_and_maybe_destroy_room(
        &self,
        room_id: &str,
        connection_id: ConnectionId,
    ) -> Result<LeaveOutcome, RcError> {
        let Some(handle) = self.get_room(room_id) else {
            return Ok(LeaveOutcome::default());
        };

        let outcome = match handle.leave(connection_id).await {
            Ok(outcome) => outcome,
            Err(RcError::RoomClosed(_)) => LeaveOutcome::default(),
            Err(e) => return Err(e),
        };

        if outcome.room_closed {
            self.inner.forget(room_id, &handle);
        }

        Ok(outcome)
    }

    #[must_use]
    pub fn status(&self) -> RegistryStatus {
        RegistryStatus {
            rooms: self.inner.rooms.len(),
            peers: self.inner.metrics.peer_count(),
        }
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }

    /// Stop accepting rooms, cancel every room actor and wait for them to stop.
    pub async fn shutdown(&self) {
        self.inner.draining.store(true, Ordering::SeqCst);
        self.inner.root_token.cancel();

        let rooms: Vec<(String, RoomActorHandle)> = self
            .inner
            .rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        info!(
            target: "rc.registry",
            rooms = rooms.len(),
            "Shutting down room registry"
        );

        for (room_id, handle) in rooms {
            if tokio::time::timeout(ROOM_SHUTDOWN_TIMEOUT, handle.closed())
                .await
                .is_err()
            {
                warn!(
                    target: "rc.registry",
                    room_id = %room_id,
                    "Room actor did not stop within timeout"
                );
            }
            self.inner.forget(&room_id, &handle);
        }

        info!(target: "rc.registry", "Room registry shut down");
    }

    fn spawn_room(&self, room_id: &str, router: Arc<dyn Router>) -> RoomActorHandle {
        let (handle, task_handle) = RoomActor::spawn(
            room_id.to_string(),
            Arc::clone(&router),
            self.inner.root_token.child_token(),
            Arc::clone(&self.inner.metrics),
        );

        tokio::spawn(supervise_room(
            Arc::downgrade(&self.inner),
            room_id.to_string(),
            handle.clone(),
            router,
            task_handle,
        ));

        handle
    }
}

/// Wait for a room actor to exit, then release its router and registry entry.
async fn supervise_room(
    registry: Weak<RegistryInner>,
    room_id: String,
    handle: RoomActorHandle,
    router: Arc<dyn Router>,
    task_handle: JoinHandle<()>,
) {
    let result = task_handle.await;

    if let Err(join_error) = result {
        if join_error.is_panic() {
            error!(
                target: "rc.registry",
                room_id = %room_id,
                error = ?join_error,
                "Room actor panicked, room dropped"
            );
            if let Some(inner) = registry.upgrade() {
                inner.metrics.record_panic();
                inner.metrics.peers_left(handle.peer_count());
            }
        }
    }

    router.close();

    if let Some(inner) = registry.upgrade() {
        inner.forget(&room_id, &handle);
    }
}
