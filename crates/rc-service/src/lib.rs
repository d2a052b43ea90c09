//! Room Controller (RC) Service Library
//!
//! Signaling and session orchestration for multi-party WebRTC calls on top
//! of a selective-forwarding media engine:
//!
//! - Room lifecycle (created on first join, destroyed when the last peer leaves)
//! - Per-peer transport negotiation (one send and one receive transport)
//! - Producer/consumer fan-out (`newProducer` broadcasts, gated consume)
//! - Presence broadcasts (`peerLeft`, `peerMuteChange`)
//!
//! The media engine itself is consumed through the traits in [`media`]; this
//! crate never touches RTP.
//!
//! # Architecture
//!
//! ```text
//! WebSocket (/ws)
//! └── SignalingSession (one per connection, events handled in order)
//!     └── RoomRegistry (DashMap of live rooms)
//!         └── RoomActor (one per room, single writer of room state)
//!             ├── Router (media engine)
//!             └── PeerSession (one per connection in the room)
//! ```
//!
//! # Modules
//!
//! - [`actors`] - Room registry, room actors and peer bookkeeping
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with signaling error codes
//! - [`media`] - Media engine adapter traits
//! - [`negotiation`] - Transport, produce and consume negotiation steps
//! - [`observability`] - Metrics, health endpoints and tracing setup
//! - [`signaling`] - Wire protocol, per-connection session, WebSocket endpoint

pub mod actors;
pub mod config;
pub mod errors;
pub mod media;
pub mod negotiation;
pub mod observability;
pub mod signaling;
