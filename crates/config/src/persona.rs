//! Agent persona configuration
//!
//! Every conversational knob that used to be a separate copy of the
//! call handler — persona prompt, fixed lines, closing-phrase and
//! interrupt-keyword sets — lives here as data.

use serde::{Deserialize, Serialize};

/// Persona and conversational policy for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Display name the agent uses for itself
    #[serde(default = "default_name")]
    pub name: String,

    /// System instruction sent with every generation call
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Fixed line spoken when the call connects
    #[serde(default = "default_opening_line")]
    pub opening_line: String,

    /// Fixed line spoken before hanging up
    #[serde(default = "default_closing_line")]
    pub closing_line: String,

    /// Fixed line used when a generation call fails or times out
    #[serde(default = "default_fallback_line")]
    pub fallback_line: String,

    /// Neutral continuation line after a no-input timeout
    #[serde(default = "default_reprompt_line")]
    pub reprompt_line: String,

    /// Human phrases that end the call (case-insensitive substrings)
    #[serde(default = "default_closing_phrases")]
    pub closing_phrases: Vec<String>,

    /// Keywords that trigger barge-in when keyword gating is on
    #[serde(default = "default_interrupt_keywords")]
    pub interrupt_keywords: Vec<String>,

    /// Restrict barge-in to utterances matching the keyword set.
    /// Off by default: any speech interrupts the agent.
    #[serde(default)]
    pub keyword_gated_barge_in: bool,
}

fn default_name() -> String {
    "Alex".to_string()
}

fn default_system_prompt() -> String {
    "You are a professional, friendly assistant on an outbound phone call. \
     Speak naturally and conversationally. Keep responses to one or two short \
     sentences; you are on a live call. Ask one question at a time and never \
     use lists, headers, or markdown."
        .to_string()
}

fn default_opening_line() -> String {
    "Hello, this is Alex calling. Do you have a moment to talk?".to_string()
}

fn default_closing_line() -> String {
    "Thank you for your time. Goodbye!".to_string()
}

fn default_fallback_line() -> String {
    "I apologize, I'm having a little trouble with my connection. \
     Could you say that again?"
        .to_string()
}

fn default_reprompt_line() -> String {
    "Are you still there?".to_string()
}

fn default_closing_phrases() -> Vec<String> {
    ["goodbye", "bye", "thank you", "not interested"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_interrupt_keywords() -> Vec<String> {
    ["stop", "wait", "hold on"].into_iter().map(String::from).collect()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            system_prompt: default_system_prompt(),
            opening_line: default_opening_line(),
            closing_line: default_closing_line(),
            fallback_line: default_fallback_line(),
            reprompt_line: default_reprompt_line(),
            closing_phrases: default_closing_phrases(),
            interrupt_keywords: default_interrupt_keywords(),
            keyword_gated_barge_in: false,
        }
    }
}

impl PersonaConfig {
    /// Does this human utterance contain a closing phrase?
    pub fn matches_closing_phrase(&self, utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        self.closing_phrases.iter().any(|p| lower.contains(&p.to_lowercase()))
    }

    /// Does this human utterance contain an interrupt keyword?
    pub fn matches_interrupt_keyword(&self, utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        self.interrupt_keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closing_phrase_matching() {
        let persona = PersonaConfig::default();
        assert!(persona.matches_closing_phrase("ok thank you, BYE now"));
        assert!(persona.matches_closing_phrase("Goodbye."));
        assert!(!persona.matches_closing_phrase("tell me more"));
    }

    #[test]
    fn test_interrupt_keyword_matching() {
        let persona = PersonaConfig::default();
        assert!(persona.matches_interrupt_keyword("wait a second"));
        assert!(persona.matches_interrupt_keyword("STOP"));
        assert!(!persona.matches_interrupt_keyword("keep going"));
    }
}
