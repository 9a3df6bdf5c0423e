//! Language-model collaborator boundary
//!
//! Two ways of talking to the language-model service:
//! - request/response chat completion for webhook turn mode
//!   ([`chat::ChatClient`], wrapped by [`generator::TurnGenerator`]);
//! - a persistent duplex stream for realtime streaming mode
//!   ([`realtime`]).

pub mod chat;
pub mod generator;
pub mod prompt;
pub mod realtime;

pub use chat::{ChatClient, ChatModel, Message, Role};
pub use generator::{GeneratedReply, GeneratorConfig, TurnGenerator};
pub use prompt::PromptBuilder;
pub use realtime::{RealtimeClient, RealtimeCommand, RealtimeEvent};

use thiserror::Error;

/// Language-model collaborator errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Collaborator unreachable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("Collaborator returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Generation timed out after {0}ms")]
    Timeout(u64),

    #[error("Realtime stream error: {0}")]
    Stream(String),
}
