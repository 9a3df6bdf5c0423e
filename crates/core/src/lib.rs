//! Core types for the dialagent call engine
//!
//! Foundational types shared across all other crates:
//! - Call and utterance identifiers
//! - Conversation turns
//! - Call lifecycle phases

pub mod call;
pub mod transcript;

pub use call::{CallId, CallPhase, Speaker, Turn, UtteranceId};
pub use transcript::TranscriptEntry;
