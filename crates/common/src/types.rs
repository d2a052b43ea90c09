//! Common data types for Room Controller components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a live signaling connection.
///
/// Assigned when a socket is accepted. Serializes as the bare UUID string so
/// it can travel verbatim in `connectionId` wire fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind of a media stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
}

impl MediaKind {
    /// Returns the kind as its wire string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }

    /// Returns the `appData` key that carries the mute flag for this kind.
    #[must_use]
    pub const fn mute_flag_key(&self) -> &'static str {
        match self {
            MediaKind::Audio => "isAudioMute",
            MediaKind::Video => "isVideoMute",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a transport from the owning peer's point of view.
///
/// Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportRole {
    /// Send direction: carries this peer's producers.
    Producer,
    /// Receive direction: carries this peer's consumers.
    Consumer,
}

impl TransportRole {
    /// Map the `sender` flag of a transport request to a role.
    #[must_use]
    pub const fn from_sender_flag(sender: bool) -> Self {
        if sender {
            TransportRole::Producer
        } else {
            TransportRole::Consumer
        }
    }

    /// Returns the role as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportRole::Producer => "producer",
            TransportRole::Consumer => "consumer",
        }
    }
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_serializes_as_string() {
        let id = ConnectionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));

        let parsed: ConnectionId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_connection_id_from_str_rejects_garbage() {
        assert!("not-a-uuid".parse::<ConnectionId>().is_err());
    }

    #[test]
    fn test_media_kind_wire_names() {
        assert_eq!(serde_json::to_string(&MediaKind::Video).unwrap(), "\"video\"");
        let kind: MediaKind = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(kind, MediaKind::Audio);
        assert_eq!(MediaKind::Audio.mute_flag_key(), "isAudioMute");
        assert_eq!(MediaKind::Video.mute_flag_key(), "isVideoMute");
    }

    #[test]
    fn test_transport_role_from_sender_flag() {
        assert_eq!(TransportRole::from_sender_flag(true), TransportRole::Producer);
        assert_eq!(TransportRole::from_sender_flag(false), TransportRole::Consumer);
        assert_eq!(TransportRole::Consumer.to_string(), "consumer");
    }
}
