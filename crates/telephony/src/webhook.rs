//! Webhook payload parsing
//!
//! The provider posts form-encoded events per call: answered-call
//! turns with an optional speech transcription, and status callbacks.

use serde::Deserialize;

/// Per-turn voice webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,

    /// Transcribed human speech; absent on the first webhook after the
    /// call is answered, empty when the provider reports silence.
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,

    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
}

impl VoiceWebhook {
    /// Transcript text, with silence normalized to an empty string.
    pub fn transcript(&self) -> &str {
        self.speech_result.as_deref().unwrap_or("").trim()
    }
}

/// Call status callback payload.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: String,

    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

impl StatusWebhook {
    /// Has the call left the in-progress state for good?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.call_status.as_str(),
            "completed" | "busy" | "failed" | "no-answer" | "canceled"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_webhook_parsing() {
        let payload: VoiceWebhook =
            serde_urlencoded_like("CallSid=CA1&SpeechResult=hello+there&CallStatus=in-progress");
        assert_eq!(payload.call_sid, "CA1");
        assert_eq!(payload.transcript(), "hello there");
    }

    #[test]
    fn test_voice_webhook_without_speech() {
        let payload: VoiceWebhook = serde_urlencoded_like("CallSid=CA2");
        assert_eq!(payload.transcript(), "");
    }

    #[test]
    fn test_status_terminal() {
        let done = StatusWebhook {
            call_sid: "CA1".to_string(),
            call_status: "completed".to_string(),
        };
        assert!(done.is_terminal());

        let ringing = StatusWebhook {
            call_sid: "CA1".to_string(),
            call_status: "ringing".to_string(),
        };
        assert!(!ringing.is_terminal());
    }

    // Minimal form decoding for tests without pulling serde_urlencoded in.
    fn serde_urlencoded_like<T: serde::de::DeserializeOwned>(query: &str) -> T {
        let map: serde_json::Map<String, serde_json::Value> = query
            .split('&')
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                Some((
                    k.to_string(),
                    serde_json::Value::String(v.replace('+', " ")),
                ))
            })
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).expect("valid payload")
    }
}
