//! HTTP and WebSocket surface
//!
//! Exposes the call-control API, the provider webhooks, the media
//! stream endpoint and the live transcript feed.

pub mod http;
pub mod media;
pub mod state;

pub use http::build_router;
pub use state::{AppState, SharedState};
