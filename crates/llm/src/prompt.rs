//! Prompt building
//!
//! Assembles the persona system instruction and a bounded window of
//! recent conversation history. The full transcript is never sent:
//! cost and latency are bounded by the smaller of an exchange count
//! and a character budget.

use dialagent_config::PersonaConfig;
use dialagent_core::{Speaker, Turn};

use crate::chat::Message;

/// Prompt builder for one generation call
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self { messages: Vec::new() }
    }

    /// Add the persona system instruction.
    pub fn system_prompt(mut self, persona: &PersonaConfig) -> Self {
        self.messages.push(Message::system(format!(
            "Your name is {name}. {prompt}",
            name = persona.name,
            prompt = persona.system_prompt,
        )));
        self
    }

    /// Add a bounded window of recent turns.
    ///
    /// Keeps at most `max_exchanges` human/agent exchanges, and trims
    /// oldest-first until the window fits `char_budget`.
    pub fn with_history(mut self, turns: &[Turn], max_exchanges: usize, char_budget: usize) -> Self {
        let window = bounded_window(turns, max_exchanges, char_budget);

        for turn in window {
            let msg = match turn.speaker {
                Speaker::Human => Message::user(&turn.text),
                Speaker::Agent => Message::assistant(&turn.text),
            };
            self.messages.push(msg);
        }
        self
    }

    /// Add the current human utterance.
    pub fn user_message(mut self, text: &str) -> Self {
        self.messages.push(Message::user(text));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Select the trailing window of `turns` bounded by exchange count and
/// character budget, whichever is smaller.
fn bounded_window(turns: &[Turn], max_exchanges: usize, char_budget: usize) -> &[Turn] {
    // One exchange is a human turn plus the agent reply.
    let max_turns = max_exchanges.saturating_mul(2);
    let mut start = turns.len().saturating_sub(max_turns);

    let mut chars: usize = turns[start..].iter().map(|t| t.text.len()).sum();
    while start < turns.len() && chars > char_budget {
        chars -= turns[start].text.len();
        start += 1;
    }

    &turns[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;

    fn turns(n: usize) -> Vec<Turn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    Turn::human(format!("human {}", i))
                } else {
                    Turn::agent(format!("agent {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_window_bounded_by_exchanges() {
        let turns = turns(10);
        let window = bounded_window(&turns, 3, 10_000);
        assert_eq!(window.len(), 6);
        assert_eq!(window[0].text, "human 4");
    }

    #[test]
    fn test_window_bounded_by_chars() {
        let turns = vec![
            Turn::human("a".repeat(500)),
            Turn::agent("b".repeat(500)),
            Turn::human("c".repeat(100)),
        ];
        let window = bounded_window(&turns, 5, 600);
        assert_eq!(window.len(), 2);
        assert!(window[0].text.starts_with('b'));
    }

    #[test]
    fn test_window_smaller_than_history() {
        let turns = turns(2);
        let window = bounded_window(&turns, 3, 10_000);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_builder_shape() {
        let persona = PersonaConfig::default();
        let history = turns(4);
        let messages = PromptBuilder::new()
            .system_prompt(&persona)
            .with_history(&history, 3, 10_000)
            .user_message("what about pricing?")
            .build();

        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains(&persona.name));
        assert_eq!(messages.last().unwrap().role, Role::User);
        assert_eq!(messages.len(), 1 + 4 + 1);
    }
}
