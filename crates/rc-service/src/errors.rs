//! Room Controller error types.
//!
//! Error types map to numeric signaling error codes for client acks.
//! Internal details (engine messages, ids of other peers) are logged
//! server-side but not exposed to clients.

use crate::media::EngineError;

use common::types::{ConnectionId, TransportRole};
use thiserror::Error;

/// Room Controller error type.
///
/// Maps to signaling error codes:
/// - `InvalidMessage`: `INVALID_REQUEST` (1)
/// - Not-found family: `NOT_FOUND` (4)
/// - `RoomClosed`, `TransportRoleMismatch`: `CONFLICT` (5)
/// - `Engine`, `Internal`: `INTERNAL_ERROR` (6)
/// - `EngineUnavailable`, `Draining`: `UNAVAILABLE` (7)
/// - `IncapableConsume`: `INCOMPATIBLE` (8)
#[derive(Debug, Error)]
pub enum RcError {
    /// Room does not exist in the registry.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Room closed between lookup and use (its last peer left).
    #[error("Room closed: {0}")]
    RoomClosed(String),

    /// Connection has no peer session in the room.
    #[error("Peer not found: {0}")]
    PeerNotFound(ConnectionId),

    /// Transport is not owned by the calling peer.
    #[error("Transport not found: {0}")]
    TransportNotFound(String),

    /// Transport exists but was created for the other direction.
    #[error("Transport {transport_id} has role {actual}, expected {expected}")]
    TransportRoleMismatch {
        transport_id: String,
        expected: TransportRole,
        actual: TransportRole,
    },

    /// Producer is not present in the room.
    #[error("Producer not found: {0}")]
    ProducerNotFound(String),

    /// Consumer is not owned by the calling peer.
    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    /// Router reports the peer cannot receive this producer.
    #[error("Cannot consume producer {producer_id} with given capabilities")]
    IncapableConsume { producer_id: String },

    /// Media engine could not allocate a router for a new room.
    #[error("Media engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Media engine operation failed.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Client frame could not be parsed or failed validation.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Registry is shutting down and accepts no new rooms.
    #[error("Room controller is draining")]
    Draining,

    /// Internal error (actor channel failures and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RcError {
    /// Returns the signaling error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            RcError::InvalidMessage(_) => 1, // INVALID_REQUEST
            RcError::RoomNotFound(_)
            | RcError::PeerNotFound(_)
            | RcError::TransportNotFound(_)
            | RcError::ProducerNotFound(_)
            | RcError::ConsumerNotFound(_) => 4, // NOT_FOUND
            RcError::RoomClosed(_) | RcError::TransportRoleMismatch { .. } => 5, // CONFLICT
            RcError::Engine(_) | RcError::Internal(_) => 6, // INTERNAL_ERROR
            RcError::EngineUnavailable(_) | RcError::Draining => 7, // UNAVAILABLE
            RcError::IncapableConsume { .. } => 8, // INCOMPATIBLE
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RcError::RoomNotFound(_) => "Room not found".to_string(),
            RcError::RoomClosed(_) => "Room closed, please rejoin".to_string(),
            RcError::PeerNotFound(_) => "Not joined to this room".to_string(),
            RcError::TransportNotFound(_) => "Transport not found".to_string(),
            RcError::TransportRoleMismatch { expected, .. } => {
                format!("Transport is not a {expected} transport")
            }
            RcError::ProducerNotFound(_) => "Producer not found".to_string(),
            RcError::ConsumerNotFound(_) => "Consumer not found".to_string(),
            RcError::IncapableConsume { .. } => "Cannot consume".to_string(),
            RcError::EngineUnavailable(_) => {
                "Media server unavailable, please try again".to_string()
            }
            RcError::Engine(_) | RcError::Internal(_) => "An internal error occurred".to_string(),
            RcError::InvalidMessage(msg) => msg.clone(),
            RcError::Draining => "Server is shutting down, please reconnect".to_string(),
        }
    }

    /// Whether this error belongs to the not-found family (logged at debug).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.error_code() == 4
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(RcError::InvalidMessage("bad".to_string()).error_code(), 1);

        assert_eq!(RcError::RoomNotFound("r".to_string()).error_code(), 4);
        assert_eq!(RcError::PeerNotFound(ConnectionId::new()).error_code(), 4);
        assert_eq!(RcError::TransportNotFound("t".to_string()).error_code(), 4);
        assert_eq!(RcError::ProducerNotFound("p".to_string()).error_code(), 4);
        assert_eq!(RcError::ConsumerNotFound("c".to_string()).error_code(), 4);

        assert_eq!(RcError::RoomClosed("r".to_string()).error_code(), 5);
        assert_eq!(
            RcError::TransportRoleMismatch {
                transport_id: "t".to_string(),
                expected: TransportRole::Producer,
                actual: TransportRole::Consumer,
            }
            .error_code(),
            5
        );

        assert_eq!(
            RcError::Engine(EngineError::Closed("transport".to_string())).error_code(),
            6
        );
        assert_eq!(RcError::Internal("oops".to_string()).error_code(), 6);

        assert_eq!(
            RcError::EngineUnavailable("no workers".to_string()).error_code(),
            7
        );
        assert_eq!(RcError::Draining.error_code(), 7);

        assert_eq!(
            RcError::IncapableConsume {
                producer_id: "p".to_string()
            }
            .error_code(),
            8
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let engine_err = RcError::Engine(EngineError::Rejected {
            operation: "produce",
            reason: "worker 10.0.0.7 died".to_string(),
        });
        assert!(!engine_err.client_message().contains("10.0.0.7"));
        assert_eq!(engine_err.client_message(), "An internal error occurred");

        let unavailable = RcError::EngineUnavailable("worker pool exhausted".to_string());
        assert!(!unavailable.client_message().contains("worker"));

        let peer = ConnectionId::new();
        assert!(!RcError::PeerNotFound(peer)
            .client_message()
            .contains(&peer.to_string()));
    }

    #[test]
    fn test_engine_error_conversion() {
        let err: RcError = EngineError::Unavailable("down".to_string()).into();
        assert!(matches!(err, RcError::Engine(_)));
        assert_eq!(err.error_code(), 6);
    }

    #[test]
    fn test_not_found_family() {
        assert!(RcError::ConsumerNotFound("c".to_string()).is_not_found());
        assert!(!RcError::Draining.is_not_found());
        assert!(!RcError::IncapableConsume {
            producer_id: "p".to_string()
        }
        .is_not_found());
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                RcError::TransportRoleMismatch {
                    transport_id: "t-1".to_string(),
                    expected: TransportRole::Consumer,
                    actual: TransportRole::Producer,
                }
            ),
            "Transport t-1 has role producer, expected consumer"
        );
        assert_eq!(
            format!("{}", RcError::RoomClosed("lobby".to_string())),
            "Room closed: lobby"
        );
    }
}
