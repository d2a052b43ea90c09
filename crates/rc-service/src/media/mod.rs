//! Media engine adapter contract.
//!
//! The Room Controller never touches RTP. It drives a selective-forwarding
//! media engine through the traits in this module:
//!
//! ```text
//! MediaEngine
//! └── Router (one per room, fixed codec set)
//!     └── WebRtcTransport (one per peer per direction)
//!         ├── Producer (send-role transports only)
//!         └── Consumer (receive-role transports only, created paused)
//! ```
//!
//! ICE/DTLS/RTP parameter blobs are opaque JSON exchanged verbatim between
//! the client and the engine.
//!
//! Closing is cascading and idempotent: closing a router closes its
//! transports, closing a transport closes its producers and consumers, and
//! closing a producer closes every consumer of it. Each object exposes a
//! one-shot [`CloseSignal`] so the room can drop its bookkeeping when the
//! engine closes something on its own.

pub mod close;
pub mod codecs;
pub mod unconfigured;

pub use close::{CloseSignal, CloseTrigger};
pub use codecs::{media_codecs, RtpCodecCapability, DEFAULT_VIDEO_START_BITRATE};
pub use unconfigured::UnconfiguredEngine;

use async_trait::async_trait;
use common::types::MediaKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

/// Free-form application data attached to producers and consumers.
pub type AppData = Map<String, Value>;

/// Media engine failure. Always reported to the immediate caller.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Engine cannot serve requests (no worker, not configured).
    #[error("media engine unavailable: {0}")]
    Unavailable(String),

    /// Engine refused the operation.
    #[error("media engine rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// Target object was already closed.
    #[error("media engine object closed: {0}")]
    Closed(String),
}

/// Address a transport listens on, with an optional public address
/// announced in ICE candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenIp {
    pub ip: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub announced_ip: Option<IpAddr>,
}

/// Options for WebRTC transport creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebRtcTransportOptions {
    pub listen_ips: Vec<ListenIp>,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
}

impl Default for WebRtcTransportOptions {
    fn default() -> Self {
        Self {
            listen_ips: vec![ListenIp {
                ip: IpAddr::from([0, 0, 0, 0]),
                announced_ip: None,
            }],
            enable_udp: true,
            enable_tcp: true,
            prefer_udp: true,
        }
    }
}

/// Entry point into the media engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Allocate a router with the given codec capabilities.
    async fn create_router(
        &self,
        codecs: &[RtpCodecCapability],
    ) -> Result<Arc<dyn Router>, EngineError>;
}

/// Per-room media context.
#[async_trait]
pub trait Router: Send + Sync {
    fn id(&self) -> &str;

    /// Capabilities handed to joining clients.
    fn rtp_capabilities(&self) -> Value;

    /// Whether a peer with `rtp_capabilities` can receive `producer_id`.
    fn can_consume(&self, producer_id: &str, rtp_capabilities: &Value) -> bool;

    async fn create_webrtc_transport(
        &self,
        options: &WebRtcTransportOptions,
    ) -> Result<Arc<dyn WebRtcTransport>, EngineError>;

    /// Close the router and everything created on it. Idempotent.
    fn close(&self);
}

/// A negotiated ICE/DTLS path.
#[async_trait]
pub trait WebRtcTransport: Send + Sync {
    fn id(&self) -> &str;
    fn ice_parameters(&self) -> Value;
    fn ice_candidates(&self) -> Value;
    fn dtls_parameters(&self) -> Value;

    /// Complete the DTLS handshake with the client's parameters.
    async fn connect(&self, dtls_parameters: Value) -> Result<(), EngineError>;

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: Value,
        app_data: AppData,
    ) -> Result<Arc<dyn Producer>, EngineError>;

    async fn consume(
        &self,
        producer_id: &str,
        rtp_capabilities: Value,
        paused: bool,
        app_data: AppData,
    ) -> Result<Arc<dyn Consumer>, EngineError>;

    /// Close the transport and its producers/consumers. Idempotent.
    fn close(&self);

    fn closed(&self) -> CloseSignal;
}

/// An accepted outgoing stream.
pub trait Producer: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> MediaKind;
    fn close(&self);
    fn closed(&self) -> CloseSignal;
}

/// A peer's receive handle for another peer's producer.
#[async_trait]
pub trait Consumer: Send + Sync {
    fn id(&self) -> &str;
    fn producer_id(&self) -> &str;
    fn kind(&self) -> MediaKind;
    fn rtp_parameters(&self) -> Value;
    fn paused(&self) -> bool;

    /// Start forwarding media to the client.
    async fn resume(&self) -> Result<(), EngineError>;

    fn close(&self);
    fn closed(&self) -> CloseSignal;
}
