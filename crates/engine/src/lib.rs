//! Conversation engine
//!
//! Owns the per-call turn-taking state machine and everything that
//! drives it: conversation context, barge-in policy, the session
//! actor and its registry, and the media relay for streaming calls.

pub mod barge_in;
pub mod context;
pub mod registry;
pub mod relay;
pub mod session;

pub use barge_in::{BargeInController, BargeInDecision, SpeechSignal};
pub use context::ConversationContext;
pub use registry::SessionRegistry;
pub use relay::{run_relay, RelayConfig, RelayControl};
pub use session::{
    spawn_session, CallSession, HangupReason, SessionAction, SessionConfig, SessionEvent,
    SessionHandle, SessionMode, Step,
};

use dialagent_core::CallId;
use thiserror::Error;

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No session for call {0}")]
    UnknownCall(CallId),

    #[error("Session for call {0} has ended")]
    SessionEnded(CallId),

    #[error("Session task is gone")]
    SessionClosed,

    #[error("Session capacity reached ({limit} concurrent calls)")]
    Capacity { limit: usize },
}
