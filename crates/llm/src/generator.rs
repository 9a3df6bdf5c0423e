//! Turn generation
//!
//! Produces the agent's next utterance from conversation context. The
//! public surface is infallible: a collaborator error or timeout yields
//! the persona's fixed fallback line, never an error — a generation
//! failure must not stall or drop the call.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use dialagent_config::PersonaConfig;
use dialagent_core::Turn;

use crate::chat::ChatModel;
use crate::prompt::PromptBuilder;
use crate::LlmError;

/// Generation policy knobs
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Hard wall-clock budget for one generation call
    pub timeout: Duration,
    /// Output token ceiling sent to the collaborator
    pub max_reply_tokens: u32,
    /// History window: most recent exchanges
    pub history_max_exchanges: usize,
    /// History window: character budget
    pub history_char_budget: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_reply_tokens: 50,
            history_max_exchanges: 3,
            history_char_budget: 1200,
        }
    }
}

/// One generated reply
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub text: String,
    /// True when the fallback line was substituted for a failed call
    pub fallback: bool,
}

/// Generates agent utterances via the chat-model collaborator.
pub struct TurnGenerator {
    model: Arc<dyn ChatModel>,
    persona: PersonaConfig,
    config: GeneratorConfig,
}

impl TurnGenerator {
    pub fn new(model: Arc<dyn ChatModel>, persona: PersonaConfig, config: GeneratorConfig) -> Self {
        Self {
            model,
            persona,
            config,
        }
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    /// Generate the next agent utterance given the turn history.
    ///
    /// The most recent human turn is expected to be the last entry of
    /// `turns`.
    pub async fn generate(&self, turns: &[Turn]) -> GeneratedReply {
        let messages = PromptBuilder::new()
            .system_prompt(&self.persona)
            .with_history(
                turns,
                self.config.history_max_exchanges,
                self.config.history_char_budget,
            )
            .build();

        let call = self.model.complete(&messages, self.config.max_reply_tokens);

        let result = match timeout(self.config.timeout, call).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LlmError::Timeout(self.config.timeout.as_millis() as u64)),
        };

        match result {
            Ok(text) => GeneratedReply {
                text: truncate_spoken(&text, spoken_char_ceiling(self.config.max_reply_tokens)),
                fallback: false,
            },
            Err(e) => {
                tracing::warn!(error = %e, "generation failed, using fallback line");
                GeneratedReply {
                    text: self.persona.fallback_line.clone(),
                    fallback: true,
                }
            }
        }
    }
}

/// Rough character ceiling for a spoken reply of `max_tokens` tokens.
fn spoken_char_ceiling(max_tokens: u32) -> usize {
    (max_tokens as usize).saturating_mul(6)
}

/// Cut a reply at the last sentence boundary inside `max_chars`.
///
/// Guards against collaborators that ignore the token ceiling; a reply
/// longer than ~15 spoken seconds breaks natural turn-taking.
fn truncate_spoken(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }

    let head = match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    };

    match head.rfind(['.', '!', '?']) {
        Some(idx) => head[..=idx].trim().to_string(),
        None => format!("{}...", head.trim_end()),
    }
}
