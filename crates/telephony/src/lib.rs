//! Telephony provider boundary
//!
//! Everything the engine needs from the telephony collaborator, and
//! nothing else: placing and ending calls over its REST API, parsing
//! its webhook payloads, rendering voice-response XML, and the wire
//! messages of its bidirectional media stream.

pub mod client;
pub mod media;
pub mod voice_response;
pub mod webhook;

pub use client::{PlaceCall, TelephonyClient};
pub use media::{MediaPayload, MediaStreamMessage};
pub use voice_response::VoiceResponse;
pub use webhook::{StatusWebhook, VoiceWebhook};

use thiserror::Error;

/// Telephony provider errors
#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("Provider unreachable: {0}")]
    Unavailable(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}
