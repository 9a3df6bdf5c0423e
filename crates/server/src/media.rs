//! Provider media stream endpoint (streaming mode)
//!
//! The provider connects here after a `Connect`/`Stream` response and
//! speaks its JSON frame protocol. The handler waits for the start
//! frame to learn which call this socket belongs to, dials the
//! realtime model stream, and then hands both sides to the engine's
//! relay. This task only shuttles frames between the socket and the
//! relay channels.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use tokio::sync::mpsc;

use dialagent_core::CallId;
use dialagent_engine::{run_relay, RelayConfig, RelayControl, SessionHandle};
use dialagent_llm::RealtimeClient;
use dialagent_telephony::MediaStreamMessage;

use crate::state::SharedState;

pub async fn media_stream(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(state, socket))
}

async fn handle_stream(state: SharedState, mut socket: WebSocket) {
    let Some((start_frame, call_id)) = await_start(&mut socket).await else {
        tracing::warn!("media stream closed before start frame");
        return;
    };

    let session = match state.registry.get(&call_id) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(call_id = %call_id, error = %e, "media stream for unknown call");
            return;
        }
    };

    let (model_cmd, model_events) = match RealtimeClient::connect(
        &state.settings.llm.realtime_url,
        &state.settings.llm.api_key,
        &state.settings.llm.realtime_model,
        &state.settings.persona.system_prompt,
    )
    .await
    {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(call_id = %call_id, error = %e, "realtime connect failed");
            return;
        }
    };

    let (to_relay, from_phone) = mpsc::channel::<MediaStreamMessage>(64);
    let (to_phone, mut from_relay) = mpsc::channel::<MediaStreamMessage>(64);
    let (control_tx, control_rx) = mpsc::channel::<RelayControl>(8);

    state.register_relay(call_id.clone(), control_tx);

    let relay = tokio::spawn(run_relay(
        session.clone(),
        RelayConfig {
            idle_timeout: std::time::Duration::from_secs(
                state.settings.engine.relay_idle_timeout_secs,
            ),
        },
        state.transcript_feed.clone(),
        from_phone,
        to_phone,
        model_cmd,
        model_events,
        control_rx,
    ));

    // Replay the start frame so the relay learns the stream sid.
    if to_relay.send(start_frame).await.is_err() {
        state.drop_relay(&call_id);
        return;
    }

    pump_socket(&mut socket, to_relay, &mut from_relay, &session).await;

    state.drop_relay(&call_id);
    let _ = relay.await;
    tracing::info!(call_id = %call_id, "media stream finished");
}

/// Read frames until the start frame identifies the call.
async fn await_start(socket: &mut WebSocket) -> Option<(MediaStreamMessage, CallId)> {
    while let Some(Ok(msg)) = socket.recv().await {
        let WsMessage::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<MediaStreamMessage>(text.as_str()) else {
            continue;
        };
        match &frame {
            MediaStreamMessage::Start { start, .. } => {
                let call_id = CallId::new(start.call_sid.clone());
                return Some((frame, call_id));
            }
            MediaStreamMessage::Connected => {}
            MediaStreamMessage::Stop => return None,
            _ => {}
        }
    }
    None
}

/// Shuttle frames between the socket and the relay until either side
/// is done.
async fn pump_socket(
    socket: &mut WebSocket,
    to_relay: mpsc::Sender<MediaStreamMessage>,
    from_relay: &mut mpsc::Receiver<MediaStreamMessage>,
    session: &SessionHandle,
) {
    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Ok(frame) = serde_json::from_str::<MediaStreamMessage>(text.as_str()) {
                            let stop = matches!(frame, MediaStreamMessage::Stop);
                            if to_relay.send(frame).await.is_err() {
                                break;
                            }
                            if stop {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => {
                        // Socket gone; the relay notices the closed
                        // channel and ends the session.
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            frame = from_relay.recv() => {
                let Some(frame) = frame else { break };
                let Ok(json) = serde_json::to_string(&frame) else { continue };
                if socket.send(WsMessage::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }

        if session.is_ended() {
            break;
        }
    }
}
