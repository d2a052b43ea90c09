//! Room lifecycle tests.
//!
//! Drives the registry through `TestPeer` clients against the in-memory
//! media engine to verify:
//! - Rooms exist exactly while they have peers
//! - Leave and disconnect are idempotent
//! - Concurrent joins converge on one router per room
//! - A leave racing an in-flight engine call leaks nothing
//! - Shutdown drains every room

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

use std::sync::Arc;
use std::time::Duration;

use common::types::MediaKind;
use futures::future::join_all;
use rc_service::actors::{RoomNotification, RoomRegistry, RoomSettings};
use rc_service::media::UnconfiguredEngine;
use rc_test_utils::{room_id, MockMediaEngine, TestPeer};
use serde_json::json;

fn registry(engine: &MockMediaEngine) -> RoomRegistry {
    RoomRegistry::new(engine.as_engine(), RoomSettings::default())
}

// ============================================================================
// Room existence
// ============================================================================

#[tokio::test]
async fn test_scenario_join_empty_room_then_second_peer() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let room = room_id("r1");

    let mut x = TestPeer::new(&registry);
    let mut y = TestPeer::new(&registry);

    let x_reply = x.join(&room).await.unwrap();
    assert_eq!(x_reply["existingProducers"], json!([]));
    assert!(x_reply["rtpCapabilities"]["codecs"].is_array());

    let y_reply = y.join(&room).await.unwrap();
    assert_eq!(y_reply["existingProducers"], json!([]));
    assert_eq!(y_reply["rtpCapabilities"], x_reply["rtpCapabilities"]);

    assert_eq!(engine.routers_created(), 1);
    assert_eq!(registry.status().rooms, 1);
    assert_eq!(registry.status().peers, 2);
}

#[tokio::test]
async fn test_scenario_disconnect_then_last_leave_removes_room() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let room = room_id("r1");

    let mut x = TestPeer::new(&registry);
    let mut y = TestPeer::new(&registry);
    x.join(&room).await.unwrap();
    y.join(&room).await.unwrap();

    let x_id = x.connection_id();
    x.disconnect().await;

    match y.next_event().await.unwrap() {
        RoomNotification::PeerLeft(event) => assert_eq!(event.connection_id, x_id),
        other => panic!("expected peerLeft, got {other:?}"),
    }
    assert!(registry.get_room(&room).is_some(), "room should survive with Y");

    y.leave(&room).await;

    assert!(registry.get_room(&room).is_none());
    assert_eq!(registry.status().rooms, 0);
    assert_eq!(registry.status().peers, 0);
    assert_eq!(engine.live_routers(), 0);
}

#[tokio::test]
async fn test_room_recreated_after_destroy() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let room = room_id("recycle");

    let mut x = TestPeer::new(&registry);
    x.join(&room).await.unwrap();
    x.leave(&room).await;
    assert!(registry.get_room(&room).is_none());

    x.join(&room).await.unwrap();
    assert!(registry.get_room(&room).is_some());
    assert_eq!(engine.routers_created(), 2);
    assert_eq!(engine.live_routers(), 1);
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let (room_a, room_b) = (room_id("a"), room_id("b"));

    let mut x = TestPeer::new(&registry);
    let mut y = TestPeer::new(&registry);
    x.join(&room_a).await.unwrap();
    let (send, _recv) = y.join_with_transports(&room_b).await.unwrap();
    y.produce(&room_b, &send, MediaKind::Audio).await.unwrap();

    assert!(x.try_next_event().is_none());
    assert_eq!(registry.status().rooms, 2);
}

#[tokio::test]
async fn test_empty_room_id_rejected() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let mut x = TestPeer::new(&registry);

    let reply = x.request("joinRoom", json!({"roomId": ""})).await.unwrap();
    assert_eq!(reply["code"], 1);
    assert_eq!(registry.status().rooms, 0);
}

// ============================================================================
// Leave idempotence
// ============================================================================

#[tokio::test]
async fn test_leave_is_idempotent() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let room = room_id("idem");

    let mut x = TestPeer::new(&registry);
    let mut y = TestPeer::new(&registry);
    x.join(&room).await.unwrap();
    y.join(&room).await.unwrap();

    x.leave(&room).await;
    x.leave(&room).await;
    x.disconnect().await;

    let events = y.drain_events();
    assert_eq!(events.len(), 1, "exactly one peerLeft expected: {events:?}");
    assert_eq!(registry.status().peers, 1);
}

#[tokio::test]
async fn test_leave_unknown_room_is_noop() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let mut x = TestPeer::new(&registry);

    x.leave("never-created").await;
    x.disconnect().await;

    assert_eq!(registry.status().rooms, 0);
    assert_eq!(engine.routers_created(), 0);
}

#[tokio::test]
async fn test_leave_releases_media_resources() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let room = room_id("release");

    let mut x = TestPeer::new(&registry);
    let mut y = TestPeer::new(&registry);
    let (x_send, _) = x.join_with_transports(&room).await.unwrap();
    let (_, y_recv) = y.join_with_transports(&room).await.unwrap();
    let producer = x.produce(&room, &x_send, MediaKind::Video).await.unwrap();
    y.consume(&room, &y_recv, &producer).await.unwrap();

    assert_eq!(engine.live_transports(), 4);
    assert_eq!(engine.live_consumers(), 1);

    x.leave(&room).await;

    // X's transports and producer are gone, and so is Y's consumer of it
    assert_eq!(engine.live_transports(), 2);
    assert_eq!(engine.live_producers(), 0);
    assert_eq!(engine.live_consumers(), 0);

    let state = registry.get_room(&room).unwrap().get_state().await.unwrap();
    assert!(state.peer(x.connection_id()).is_none());
    assert!(state.peer(y.connection_id()).unwrap().consumer_ids.is_empty());
}

// ============================================================================
// Rejoin
// ============================================================================

#[tokio::test]
async fn test_rejoin_resets_peer_session() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let room = room_id("rejoin");

    let mut x = TestPeer::new(&registry);
    let mut y = TestPeer::new(&registry);
    y.join(&room).await.unwrap();
    let (send, _) = x.join_with_transports(&room).await.unwrap();
    x.produce(&room, &send, MediaKind::Audio).await.unwrap();
    y.drain_events();

    x.join(&room).await.unwrap();

    assert_eq!(engine.live_transports(), 0);
    assert_eq!(engine.live_producers(), 0);
    assert_eq!(registry.status().peers, 2);
    match y.next_event().await.unwrap() {
        RoomNotification::PeerLeft(event) => assert_eq!(event.connection_id, x.connection_id()),
        other => panic!("expected peerLeft for the reset session, got {other:?}"),
    }
    assert!(y.try_next_event().is_none());

    let state = registry.get_room(&room).unwrap().get_state().await.unwrap();
    let peer = state.peer(x.connection_id()).unwrap();
    assert!(peer.transport_ids.is_empty());
    assert!(peer.producer_ids.is_empty());
}

// ============================================================================
// Engine availability
// ============================================================================

#[tokio::test]
async fn test_join_without_engine_fails_unavailable() {
    let registry = RoomRegistry::new(Arc::new(UnconfiguredEngine), RoomSettings::default());
    let mut x = TestPeer::new(&registry);

    let reply = x
        .request("joinRoom", json!({"roomId": "no-engine"}))
        .await
        .unwrap();

    assert_eq!(reply["code"], 7);
    assert!(reply["error"].is_string());
    assert_eq!(registry.status().rooms, 0);
}

#[tokio::test]
async fn test_router_failure_leaves_no_room() {
    let engine = MockMediaEngine::builder().fail_router_creation().build();
    let registry = registry(&engine);
    let mut x = TestPeer::new(&registry);

    assert!(x.join(&room_id("broken")).await.is_err());
    assert_eq!(registry.status().rooms, 0);
    assert!(x.session().joined_rooms().is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_joins_share_one_router() {
    let engine = MockMediaEngine::builder()
        .latency(Duration::from_millis(20))
        .build();
    let registry = registry(&engine);
    let room = room_id("rush");

    let mut peers: Vec<TestPeer> = (0..8).map(|_| TestPeer::new(&registry)).collect();
    let results = join_all(peers.iter_mut().map(|p| p.join(&room))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(registry.status().rooms, 1);
    assert_eq!(registry.status().peers, 8);
    assert_eq!(engine.live_routers(), 1, "surplus routers must be closed");
    assert_eq!(
        registry.get_room(&room).unwrap().get_state().await.unwrap().peers.len(),
        8
    );
}

#[tokio::test]
async fn test_concurrent_leaves_destroy_room_once() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);
    let room = room_id("exodus");

    let mut peers: Vec<TestPeer> = (0..6).map(|_| TestPeer::new(&registry)).collect();
    for peer in &mut peers {
        peer.join(&room).await.unwrap();
    }

    join_all(peers.iter_mut().map(|p| p.leave(&room))).await;

    assert_eq!(registry.status().rooms, 0);
    assert_eq!(registry.status().peers, 0);
    assert_eq!(engine.live_routers(), 0);
}

#[tokio::test]
async fn test_leave_during_transport_creation_leaks_nothing() {
    let engine = MockMediaEngine::builder()
        .latency(Duration::from_millis(50))
        .build();
    let registry = registry(&engine);
    let room = room_id("race");

    let mut x = TestPeer::new(&registry);
    let mut y = TestPeer::new(&registry);
    x.join(&room).await.unwrap();
    y.join(&room).await.unwrap();
    let x_id = x.connection_id();

    let leave = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        registry
            .remove_peer_and_maybe_destroy_room(&room, x_id)
            .await
            .unwrap();
    };
    let (created, ()) = tokio::join!(x.create_transport(&room, true), leave);

    assert!(created.is_err(), "transport must not attach to a departed peer");
    assert_eq!(engine.live_transports(), 0);

    let state = registry.get_room(&room).unwrap().get_state().await.unwrap();
    assert_eq!(state.peers.len(), 1);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_drains_rooms() {
    let engine = MockMediaEngine::new();
    let registry = registry(&engine);

    let mut x = TestPeer::new(&registry);
    let mut y = TestPeer::new(&registry);
    x.join_with_transports(&room_id("one")).await.unwrap();
    y.join(&room_id("two")).await.unwrap();

    registry.shutdown().await;

    assert_eq!(registry.status().rooms, 0);
    assert_eq!(engine.live_routers(), 0);
    assert_eq!(engine.live_transports(), 0);

    let reply = x
        .request("joinRoom", json!({"roomId": "after-shutdown"}))
        .await
        .unwrap();
    assert_eq!(reply["code"], 7);
}
