//! # RC Test Utilities
//!
//! Shared test utilities for the Room Controller (RC) service.
//!
//! This crate provides an in-memory media engine and a scripted signaling
//! client for isolated RC testing without a real SFU or sockets.
//!
//! ## Modules
//!
//! - `mock_engine` - Mock media engine with failure and latency injection
//! - `test_peer` - Client that speaks the JSON signaling protocol
//! - `fixtures` - Capabilities, DTLS and RTP parameter payloads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let engine = MockMediaEngine::new();
//!     let registry = RoomRegistry::new(engine.as_engine(), RoomSettings::default());
//!
//!     let room = room_id("standup");
//!     let mut alice = TestPeer::new(&registry);
//!     let (send, _recv) = alice.join_with_transports(&room).await?;
//!     alice.produce(&room, &send, MediaKind::Audio).await?;
//!
//!     assert_eq!(engine.live_producers(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_engine;
pub mod test_peer;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_engine::{MockMediaEngine, MockMediaEngineBuilder};
pub use test_peer::TestPeer;
