//! Barge-in policy
//!
//! Decides whether human speech detected while the agent is speaking
//! should cut the agent off. Two modes: full (any speech interrupts)
//! and keyword-gated (only utterances containing a configured keyword
//! interrupt).
//!
//! Voice-activity signals carry no text, so keyword gating can only
//! apply to transcribed speech; a bare activity signal under gating is
//! left alone.

use dialagent_config::PersonaConfig;

/// What we know about the detected speech.
#[derive(Debug, Clone, Copy)]
pub enum SpeechSignal<'a> {
    /// Transcribed utterance
    Transcript(&'a str),
    /// Voice activity only, no text yet
    VoiceActivity,
}

/// Outcome of a barge-in check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BargeInDecision {
    /// Stop the agent utterance and hand the floor to the human
    Interrupt,
    /// Let the agent keep speaking
    Ignore,
}

/// Barge-in policy for one call.
#[derive(Debug, Clone)]
pub struct BargeInController {
    keyword_gated: bool,
    keywords: Vec<String>,
}

impl BargeInController {
    pub fn new(keyword_gated: bool, keywords: Vec<String>) -> Self {
        let keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();
        Self {
            keyword_gated,
            keywords,
        }
    }

    pub fn from_persona(persona: &PersonaConfig) -> Self {
        Self::new(
            persona.keyword_gated_barge_in,
            persona.interrupt_keywords.clone(),
        )
    }

    /// Should this speech interrupt the agent?
    ///
    /// Only meaningful while an agent utterance is in flight; callers
    /// check that first.
    pub fn decide(&self, signal: SpeechSignal<'_>) -> BargeInDecision {
        if !self.keyword_gated {
            return BargeInDecision::Interrupt;
        }

        match signal {
            SpeechSignal::Transcript(text) => {
                let lower = text.to_lowercase();
                if self.keywords.iter().any(|k| lower.contains(k.as_str())) {
                    BargeInDecision::Interrupt
                } else {
                    BargeInDecision::Ignore
                }
            }
            SpeechSignal::VoiceActivity => BargeInDecision::Ignore,
        }
    }
}
