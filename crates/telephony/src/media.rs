//! Media stream wire messages
//!
//! JSON frames exchanged over the provider's audio WebSocket. Audio
//! payloads are base64-encoded 8kHz mu-law; the relay treats them as
//! opaque bytes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Audio payload wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded audio frame
    pub payload: String,
}

/// Call metadata delivered with the stream start frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartMeta {
    #[serde(rename = "callSid", default)]
    pub call_sid: String,
}

/// One frame on the provider media stream, either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamMessage {
    /// Socket-open acknowledgement
    Connected,
    /// Stream metadata; first real frame of a call
    Start {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        #[serde(default)]
        start: StartMeta,
    },
    /// One audio frame
    Media {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    /// Playback checkpoint marker
    Mark {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
    },
    /// Discard any buffered playback audio (outbound, on barge-in)
    Clear {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
    },
    /// Stream is closing
    Stop,
}

impl MediaStreamMessage {
    /// Build an outbound audio frame from raw bytes.
    pub fn media_from_bytes(stream_sid: Option<String>, bytes: &[u8]) -> Self {
        MediaStreamMessage::Media {
            stream_sid,
            media: MediaPayload {
                payload: BASE64.encode(bytes),
            },
        }
    }

    /// Decode an inbound audio frame's payload to raw bytes.
    pub fn decode_payload(&self) -> Option<Vec<u8>> {
        match self {
            MediaStreamMessage::Media { media, .. } => BASE64.decode(&media.payload).ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_media_frame() {
        let json = r#"{"event":"media","streamSid":"MZ1","media":{"payload":"AQID"}}"#;
        let msg: MediaStreamMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.decode_payload(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_parse_start_frame() {
        let json = r#"{"event":"start","streamSid":"MZ1","start":{"callSid":"CA9"}}"#;
        let msg: MediaStreamMessage = serde_json::from_str(json).unwrap();
        match msg {
            MediaStreamMessage::Start { stream_sid, start } => {
                assert_eq!(stream_sid, "MZ1");
                assert_eq!(start.call_sid, "CA9");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_clear_frame_serialization() {
        let msg = MediaStreamMessage::Clear {
            stream_sid: Some("MZ1".to_string()),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "clear");
        assert_eq!(json["streamSid"], "MZ1");
    }

    #[test]
    fn test_media_roundtrip() {
        let msg = MediaStreamMessage::media_from_bytes(Some("MZ2".to_string()), &[7, 7, 7]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: MediaStreamMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.decode_payload(), Some(vec![7, 7, 7]));
    }
}
