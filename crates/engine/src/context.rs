//! Per-call conversation context
//!
//! Append-only transcript plus the small amount of live state the
//! turn-taking machine needs: the current phase, the utterance the
//! agent is speaking (if any), and the consecutive no-input count.
//!
//! The phase and the pending utterance move together: the context is
//! in `SpeakingReply` exactly while an utterance id is outstanding.
//! All mutation goes through methods that preserve that pairing.

use chrono::{DateTime, Utc};
use dialagent_core::{CallId, CallPhase, Turn, UtteranceId};

/// Conversation state for one call.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    call_id: CallId,
    phase: CallPhase,
    turns: Vec<Turn>,
    pending_utterance: Option<UtteranceId>,
    no_input_count: u32,
    started_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            phase: CallPhase::NotStarted,
            turns: Vec::new(),
            pending_utterance: None,
            no_input_count: 0,
            started_at: Utc::now(),
        }
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn pending_utterance(&self) -> Option<UtteranceId> {
        self.pending_utterance
    }

    pub fn no_input_count(&self) -> u32 {
        self.no_input_count
    }

    /// Move to a non-speaking phase.
    ///
    /// Panics in debug builds if used to enter `SpeakingReply`; that
    /// transition must go through [`begin_utterance`](Self::begin_utterance).
    pub fn set_phase(&mut self, phase: CallPhase) {
        debug_assert!(phase != CallPhase::SpeakingReply);
        self.pending_utterance = None;
        self.phase = phase;
    }

    /// Append a human turn.
    pub fn push_human(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::human(text));
    }

    /// Append an agent turn.
    pub fn push_agent(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::agent(text));
    }

    /// Enter `SpeakingReply` with a fresh utterance id.
    pub fn begin_utterance(&mut self) -> UtteranceId {
        let id = UtteranceId::new();
        self.pending_utterance = Some(id);
        self.phase = CallPhase::SpeakingReply;
        id
    }

    /// Complete the pending utterance if `id` still matches.
    ///
    /// Returns false when the id is stale (the utterance was already
    /// interrupted or completed); the caller treats that as a no-op.
    pub fn finish_utterance(&mut self, id: UtteranceId) -> bool {
        if self.pending_utterance != Some(id) {
            return false;
        }
        self.pending_utterance = None;
        self.phase = CallPhase::AwaitingHumanSpeech;
        true
    }

    /// Abandon the pending utterance (barge-in). No-op when nothing is
    /// pending.
    pub fn interrupt_utterance(&mut self) -> Option<UtteranceId> {
        let id = self.pending_utterance.take();
        if id.is_some() {
            self.phase = CallPhase::AwaitingHumanSpeech;
        }
        id
    }

    /// Count one no-input timeout; returns the new consecutive total.
    pub fn record_no_input(&mut self) -> u32 {
        self.no_input_count += 1;
        self.no_input_count
    }

    pub fn reset_no_input(&mut self) {
        self.no_input_count = 0;
    }

    /// Phase/utterance pairing holds.
    pub fn is_consistent(&self) -> bool {
        (self.phase == CallPhase::SpeakingReply) == self.pending_utterance.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ConversationContext {
        ConversationContext::new(CallId::new("CA1"))
    }

    #[test]
    fn test_new_context_is_not_started() {
        let c = ctx();
        assert_eq!(c.phase(), CallPhase::NotStarted);
        assert!(c.turns().is_empty());
        assert!(c.is_consistent());
    }

    #[test]
    fn test_transcript_is_append_only_through_turns() {
        let mut c = ctx();
        c.push_agent("hello");
        c.push_human("hi");
        c.push_agent("how can I help?");
        let texts: Vec<&str> = c.turns().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "hi", "how can I help?"]);
    }

    #[test]
    fn test_utterance_lifecycle() {
        let mut c = ctx();
        let id = c.begin_utterance();
        assert_eq!(c.phase(), CallPhase::SpeakingReply);
        assert!(c.is_consistent());

        assert!(c.finish_utterance(id));
        assert_eq!(c.phase(), CallPhase::AwaitingHumanSpeech);
        assert!(c.is_consistent());

        // second completion of the same id is stale
        assert!(!c.finish_utterance(id));
    }

    #[test]
    fn test_interrupt_clears_pending_utterance() {
        let mut c = ctx();
        let id = c.begin_utterance();
        assert_eq!(c.interrupt_utterance(), Some(id));
        assert_eq!(c.phase(), CallPhase::AwaitingHumanSpeech);
        assert!(c.is_consistent());

        // a late playback-finished for the interrupted utterance is stale
        assert!(!c.finish_utterance(id));
        // interrupting again with nothing pending is a no-op
        assert_eq!(c.interrupt_utterance(), None);
    }

    #[test]
    fn test_no_input_counter() {
        let mut c = ctx();
        assert_eq!(c.record_no_input(), 1);
        assert_eq!(c.record_no_input(), 2);
        c.reset_no_input();
        assert_eq!(c.no_input_count(), 0);
    }
}
