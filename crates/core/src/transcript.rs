//! Transcript feed entries
//!
//! A flat, serializable record of one turn, suitable for the live
//! transcript feed and for post-call retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::call::{CallId, Speaker, Turn};

/// One transcript line, tagged with its call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub call_id: CallId,
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn from_turn(call_id: &CallId, turn: &Turn) -> Self {
        Self {
            call_id: call_id.clone(),
            speaker: turn.speaker,
            text: turn.text.clone(),
            timestamp: turn.timestamp,
        }
    }
}

/// Render a turn sequence as plain text, one line per turn.
pub fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for turn in turns {
        let label = match turn.speaker {
            Speaker::Human => "Human",
            Speaker::Agent => "Agent",
        };
        out.push_str(label);
        out.push_str(": ");
        out.push_str(&turn.text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_transcript() {
        let turns = vec![Turn::agent("Hello there."), Turn::human("Hi.")];
        let text = render_transcript(&turns);
        assert_eq!(text, "Agent: Hello there.\nHuman: Hi.\n");
    }

    #[test]
    fn test_entry_from_turn() {
        let call_id = CallId::new("CA1");
        let turn = Turn::human("yes");
        let entry = TranscriptEntry::from_turn(&call_id, &turn);
        assert_eq!(entry.call_id, call_id);
        assert_eq!(entry.speaker, Speaker::Human);
        assert_eq!(entry.text, "yes");
    }
}
