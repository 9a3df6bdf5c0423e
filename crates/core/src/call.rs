//! Call identifiers, turns and lifecycle phases

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque per-call identifier issued by the telephony provider.
///
/// Primary key into the session registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a single agent utterance, used to correlate playback
/// completion and cancellation signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtteranceId(uuid::Uuid);

impl UtteranceId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for UtteranceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Human,
    Agent,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Human => write!(f, "human"),
            Speaker::Agent => write!(f, "agent"),
        }
    }
}

/// One utterance by either party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Human,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Call lifecycle phase.
///
/// `Ended` is terminal; it is reachable from every other phase on an
/// explicit hangup, an unrecoverable error, or a closing phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    NotStarted,
    AwaitingHumanSpeech,
    GeneratingReply,
    SpeakingReply,
    Ended,
}

impl CallPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallPhase::Ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_roundtrip() {
        let id = CallId::new("CA1234");
        assert_eq!(id.as_str(), "CA1234");
        assert_eq!(id.to_string(), "CA1234");
    }

    #[test]
    fn test_utterance_ids_unique() {
        assert_ne!(UtteranceId::new(), UtteranceId::new());
    }

    #[test]
    fn test_turn_constructors() {
        let turn = Turn::human("hello");
        assert_eq!(turn.speaker, Speaker::Human);
        assert_eq!(turn.text, "hello");

        let turn = Turn::agent("hi there");
        assert_eq!(turn.speaker, Speaker::Agent);
    }

    #[test]
    fn test_terminal_phase() {
        assert!(CallPhase::Ended.is_terminal());
        assert!(!CallPhase::AwaitingHumanSpeech.is_terminal());
    }
}
