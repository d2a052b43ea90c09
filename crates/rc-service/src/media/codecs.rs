//! Process-wide codec capability set used for every room router.

use common::types::MediaKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default `x-google-start-bitrate` hint for the video codec (kbps).
pub const DEFAULT_VIDEO_START_BITRATE: u32 = 1000;

/// Audio codec mime type.
pub const OPUS_MIME_TYPE: &str = "audio/opus";

/// Video codec mime type.
pub const VP8_MIME_TYPE: &str = "video/VP8";

/// One codec a router is created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtpCodecCapability {
    pub kind: MediaKind,
    pub mime_type: String,
    pub clock_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub channels: Option<u8>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Build the fixed codec set: Opus 48kHz stereo and VP8 90kHz with a start
/// bitrate hint.
#[must_use]
pub fn media_codecs(video_start_bitrate: u32) -> Vec<RtpCodecCapability> {
    let mut video_parameters = Map::new();
    video_parameters.insert(
        "x-google-start-bitrate".to_string(),
        Value::from(video_start_bitrate),
    );

    vec![
        RtpCodecCapability {
            kind: MediaKind::Audio,
            mime_type: OPUS_MIME_TYPE.to_string(),
            clock_rate: 48_000,
            channels: Some(2),
            parameters: Map::new(),
        },
        RtpCodecCapability {
            kind: MediaKind::Video,
            mime_type: VP8_MIME_TYPE.to_string(),
            clock_rate: 90_000,
            channels: None,
            parameters: video_parameters,
        },
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_set_contents() {
        let codecs = media_codecs(DEFAULT_VIDEO_START_BITRATE);
        assert_eq!(codecs.len(), 2);

        let audio = &codecs[0];
        assert_eq!(audio.kind, MediaKind::Audio);
        assert_eq!(audio.mime_type, "audio/opus");
        assert_eq!(audio.clock_rate, 48_000);
        assert_eq!(audio.channels, Some(2));

        let video = &codecs[1];
        assert_eq!(video.kind, MediaKind::Video);
        assert_eq!(video.mime_type, "video/VP8");
        assert_eq!(video.clock_rate, 90_000);
        assert_eq!(video.channels, None);
        assert_eq!(
            video.parameters.get("x-google-start-bitrate"),
            Some(&Value::from(1000))
        );
    }

    #[test]
    fn test_start_bitrate_is_configurable() {
        let codecs = media_codecs(2500);
        let video = codecs.iter().find(|c| c.kind == MediaKind::Video).unwrap();
        assert_eq!(
            video.parameters.get("x-google-start-bitrate"),
            Some(&Value::from(2500))
        );
    }

    #[test]
    fn test_wire_shape() {
        let json = serde_json::to_value(&media_codecs(1000)[0]).unwrap();
        assert_eq!(json["mimeType"], "audio/opus");
        assert_eq!(json["clockRate"], 48_000);
        assert_eq!(json["kind"], "audio");

        let video = serde_json::to_value(&media_codecs(1000)[1]).unwrap();
        assert!(video.get("channels").is_none());
    }
}
