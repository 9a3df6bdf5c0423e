//! HTTP API and provider webhooks

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use dialagent_core::{transcript::render_transcript, CallId, CallPhase, Turn, TranscriptEntry};
use dialagent_engine::{EngineError, HangupReason, SessionAction, SessionEvent, SessionMode, Step};
use dialagent_telephony::{PlaceCall, StatusWebhook, VoiceResponse, VoiceWebhook};

use crate::media;
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/calls", post(place_call))
        .route("/calls/{call_id}", delete(hangup_call))
        .route("/webhook/voice", post(voice_webhook))
        .route("/webhook/status", post(status_webhook))
        .route("/transcripts/{call_id}", get(get_transcript))
        .route("/transcripts/feed", get(transcript_feed))
        .route("/media", get(media::media_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API error responses
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        let status = match &e {
            EngineError::UnknownCall(_) => StatusCode::NOT_FOUND,
            EngineError::SessionEnded(_) | EngineError::SessionClosed => StatusCode::GONE,
            EngineError::Capacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.to_string())
    }
}

impl From<dialagent_telephony::TelephonyError> for ApiError {
    fn from(e: dialagent_telephony::TelephonyError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, e.to_string())
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct PlaceCallRequest {
    /// Destination number, E.164
    to: String,
}

#[derive(Debug, Serialize)]
struct PlaceCallResponse {
    call_sid: String,
}

async fn place_call(
    State(state): State<SharedState>,
    Json(req): Json<PlaceCallRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sid = state
        .telephony
        .place_call(&PlaceCall {
            to: req.to,
            answer_url: state.webhook_url(),
            status_callback_url: state.status_callback_url(),
            record: state.settings.telephony.record_calls,
        })
        .await?;

    let call_id = CallId::new(sid.clone());
    state.start_call_session(call_id)?;

    Ok((
        StatusCode::CREATED,
        Json(PlaceCallResponse { call_sid: sid }),
    ))
}

async fn hangup_call(
    State(state): State<SharedState>,
    Path(call_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let call_id = CallId::new(call_id);
    let handle = state.registry.get(&call_id)?;

    // Already ended: nothing to do, the sweep will evict it.
    if !handle.is_ended() {
        let _ = handle
            .request(SessionEvent::Hangup {
                reason: HangupReason::Requested,
            })
            .await;
        state.telephony.end_call(call_id.as_str()).await?;
    }
    if let Some(control) = state.drop_relay(&call_id) {
        let _ = control.send(dialagent_engine::RelayControl::Shutdown).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn voice_webhook(
    State(state): State<SharedState>,
    Form(payload): Form<VoiceWebhook>,
) -> Response {
    let call_id = CallId::new(payload.call_sid.clone());

    let Ok(handle) = state.registry.get(&call_id) else {
        tracing::warn!(call_id = %call_id, "webhook for unknown call");
        return xml_response(VoiceResponse::new().hangup());
    };

    let event = if handle.phase() == CallPhase::NotStarted {
        SessionEvent::Answered
    } else {
        let text = payload.transcript().to_string();
        if !text.is_empty() {
            state.publish(TranscriptEntry::from_turn(&call_id, &Turn::human(text.clone())));
        }
        SessionEvent::HumanSpeech { text }
    };

    let answered = matches!(event, SessionEvent::Answered);
    let step = match handle.request(event).await {
        Ok(step) => step,
        Err(e) => {
            tracing::warn!(call_id = %call_id, error = %e, "session unavailable");
            return xml_response(VoiceResponse::new().hangup());
        }
    };

    if state.session_mode() == SessionMode::Streaming && answered {
        // Open the duplex audio stream; the opening line is spoken
        // before the stream takes over.
        let opening = spoken_texts(&step).into_iter().next();
        let mut vr = VoiceResponse::new();
        if let Some(text) = opening {
            vr = vr.say(&text, &state.settings.telephony.voice);
        }
        vr = vr
            .connect_stream(&state.media_stream_url())
            .pause(600);
        return xml_response(vr);
    }

    publish_agent_lines(&state, &call_id, &step);
    xml_response(render_step(&state, &step))
}

async fn status_webhook(
    State(state): State<SharedState>,
    Form(payload): Form<StatusWebhook>,
) -> impl IntoResponse {
    if payload.is_terminal() {
        let call_id = CallId::new(payload.call_sid.clone());
        tracing::info!(call_id = %call_id, status = %payload.call_status, "terminal call status");
        if let Ok(handle) = state.registry.get(&call_id) {
            let _ = handle
                .dispatch(SessionEvent::Hangup {
                    reason: HangupReason::Provider,
                })
                .await;
        }
        if let Some(control) = state.drop_relay(&call_id) {
            let _ = control.send(dialagent_engine::RelayControl::Shutdown).await;
        }
    }
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct TranscriptQuery {
    /// `json` (default) or `text`
    format: Option<String>,
}

async fn get_transcript(
    State(state): State<SharedState>,
    Path(call_id): Path<String>,
    Query(query): Query<TranscriptQuery>,
) -> Result<Response, ApiError> {
    let call_id = CallId::new(call_id);
    let handle = state.registry.get(&call_id)?;
    let turns = handle.turns();

    if query.format.as_deref() == Some("text") {
        return Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            render_transcript(&turns),
        )
            .into_response());
    }

    Ok(Json(serde_json::json!({
        "call_id": call_id,
        "phase": handle.phase(),
        "turns": turns,
    }))
    .into_response())
}

/// Live transcript feed over WebSocket: one JSON entry per line spoken
/// on any call.
async fn transcript_feed(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let mut feed = state.transcript_feed.subscribe();
    ws.on_upgrade(move |mut socket: WebSocket| async move {
        loop {
            tokio::select! {
                entry = feed.recv() => {
                    let Ok(entry) = entry else { break };
                    let Ok(json) = serde_json::to_string(&entry) else { continue };
                    if socket.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                msg = socket.recv() => {
                    // Clients only listen; any close or error drops them.
                    match msg {
                        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                        _ => {}
                    }
                }
            }
        }
    })
}

fn xml_response(vr: VoiceResponse) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], vr.to_xml()).into_response()
}

fn spoken_texts(step: &Step) -> Vec<String> {
    step.actions
        .iter()
        .filter_map(|a| match a {
            SessionAction::Speak { text, .. } => Some(text.clone()),
            SessionAction::EndCall {
                farewell: Some(text),
            } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn publish_agent_lines(state: &SharedState, call_id: &CallId, step: &Step) {
    for text in spoken_texts(step) {
        state.publish(TranscriptEntry::from_turn(call_id, &Turn::agent(text)));
    }
}

/// Map session actions onto the provider's response verbs.
fn render_step(state: &SharedState, step: &Step) -> VoiceResponse {
    let voice = &state.settings.telephony.voice;
    let timeout = state.settings.engine.listen_timeout_secs;
    let action = "/webhook/voice";

    let listening = step.actions.contains(&SessionAction::Listen);
    let mut vr = VoiceResponse::new();
    let mut has_verbs = false;

    for session_action in &step.actions {
        match session_action {
            SessionAction::Speak { text, .. } => {
                // Spoken inside the gather so the human can talk over it.
                vr = if listening {
                    vr.gather_prompt(timeout, action, text, voice)
                } else {
                    vr.say(text, voice)
                };
                has_verbs = true;
            }
            SessionAction::EndCall { farewell } => {
                if let Some(text) = farewell {
                    vr = vr.say(text, voice);
                }
                vr = vr.hangup();
                return vr;
            }
            _ => {}
        }
    }

    if !has_verbs {
        // Always leave the provider gathering; an empty response would
        // drop the call.
        vr = vr.gather_speech(timeout, action);
    }
    vr
}
