//! Pre-built signaling payloads for Room Controller tests.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

static ROOM_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A room id unique within the test binary.
#[must_use]
pub fn room_id(name: &str) -> String {
    let n = ROOM_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{name}-{n}-{}", uuid::Uuid::new_v4().simple())
}

/// Receive capabilities of a typical browser (Opus + VP8).
#[must_use]
pub fn client_rtp_capabilities() -> Value {
    json!({
        "codecs": [
            {"kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2},
            {"kind": "video", "mimeType": "video/VP8", "clockRate": 90000}
        ],
        "headerExtensions": []
    })
}

/// Capabilities of a client that can only decode H264 video.
#[must_use]
pub fn incapable_rtp_capabilities() -> Value {
    json!({
        "codecs": [
            {"kind": "video", "mimeType": "video/H264", "clockRate": 90000}
        ],
        "headerExtensions": []
    })
}

/// Client DTLS parameters for `connectTransport`.
#[must_use]
pub fn dtls_parameters() -> Value {
    json!({
        "role": "client",
        "fingerprints": [
            {"algorithm": "sha-256", "value": "82:5A:68:3D:36:C3:0A:DE:AF:E7:32:43:D2:88:83:57"}
        ]
    })
}

/// Send parameters for an Opus track.
#[must_use]
pub fn audio_rtp_parameters() -> Value {
    json!({
        "mid": "0",
        "codecs": [{"mimeType": "audio/opus", "payloadType": 111, "clockRate": 48000, "channels": 2}],
        "encodings": [{"ssrc": 11_111_111}]
    })
}

/// Send parameters for a VP8 track.
#[must_use]
pub fn video_rtp_parameters() -> Value {
    json!({
        "mid": "1",
        "codecs": [{"mimeType": "video/VP8", "payloadType": 96, "clockRate": 90000}],
        "encodings": [{"ssrc": 22_222_222}]
    })
}
