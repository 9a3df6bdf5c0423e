//! Realtime duplex stream client
//!
//! Persistent bidirectional connection to the language-model service
//! for streaming mode: audio frames go up, audio frames and control
//! events come back. The wire protocol is the OpenAI-realtime event
//! shape; the rest of the system only sees [`RealtimeCommand`] and
//! [`RealtimeEvent`].

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::LlmError;

/// Control and data messages sent to the model stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeCommand {
    /// Forward one inbound audio frame (raw bytes, encoded per call)
    AppendAudio(Vec<u8>),
    /// Ask the model to produce a spoken response now
    CreateResponse,
    /// Cancel the in-flight response before it finishes streaming
    CancelResponse,
    /// Close the connection
    Close,
}

/// Events received from the model stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// One outbound audio frame (raw bytes, decoded from the wire)
    AudioDelta(Vec<u8>),
    /// Server-side voice activity: the human started speaking
    SpeechStarted,
    /// Server-side voice activity: the human stopped speaking
    SpeechStopped,
    /// A model response started streaming
    ResponseStarted,
    /// The in-flight response finished (or was cancelled)
    ResponseDone,
    /// Incremental transcript of the agent's spoken audio
    AgentTranscriptDelta(String),
    /// Final transcript of one human utterance
    HumanTranscript(String),
    /// Stream-level error reported by the collaborator
    Error(String),
}

/// Encode a command as its wire JSON.
pub fn encode_command(cmd: &RealtimeCommand) -> Option<serde_json::Value> {
    match cmd {
        RealtimeCommand::AppendAudio(bytes) => Some(serde_json::json!({
            "type": "input_audio_buffer.append",
            "audio": BASE64.encode(bytes),
        })),
        RealtimeCommand::CreateResponse => Some(serde_json::json!({
            "type": "response.create",
            "response": { "modalities": ["audio", "text"] },
        })),
        RealtimeCommand::CancelResponse => Some(serde_json::json!({
            "type": "response.cancel",
        })),
        RealtimeCommand::Close => None,
    }
}

/// Decode one wire event. Unrecognized event types return `None`.
pub fn decode_event(text: &str) -> Option<RealtimeEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let typ = value.get("type").and_then(|t| t.as_str())?;

    if typ.ends_with("audio.delta") || typ.ends_with("output_audio.delta") {
        let b64 = value
            .get("audio")
            .and_then(|a| a.as_str())
            .or_else(|| value.get("delta").and_then(|d| d.as_str()))?;
        return BASE64.decode(b64).ok().map(RealtimeEvent::AudioDelta);
    }

    match typ {
        "input_audio_buffer.speech_started" => Some(RealtimeEvent::SpeechStarted),
        "input_audio_buffer.speech_stopped" => Some(RealtimeEvent::SpeechStopped),
        "response.created" => Some(RealtimeEvent::ResponseStarted),
        "response.done" => Some(RealtimeEvent::ResponseDone),
        "response.audio_transcript.delta" => value
            .get("delta")
            .and_then(|d| d.as_str())
            .map(|s| RealtimeEvent::AgentTranscriptDelta(s.to_string())),
        "conversation.item.input_audio_transcription.completed" => value
            .get("transcript")
            .and_then(|t| t.as_str())
            .map(|s| RealtimeEvent::HumanTranscript(s.to_string())),
        "error" => {
            let msg = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown realtime error");
            Some(RealtimeEvent::Error(msg.to_string()))
        }
        _ => None,
    }
}

/// The initial session configuration event.
fn session_update(instructions: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "session.update",
        "session": {
            "modalities": ["audio", "text"],
            "instructions": instructions,
            "turn_detection": { "type": "server_vad" },
        },
    })
}

/// Realtime stream client.
pub struct RealtimeClient;

impl RealtimeClient {
    /// Connect and return the command/event channel pair.
    ///
    /// A single background task owns the socket: commands are written
    /// as they arrive, wire events are decoded and forwarded. Dropping
    /// the command sender (or sending [`RealtimeCommand::Close`])
    /// closes the connection; the event receiver then drains and ends.
    pub async fn connect(
        url: &str,
        api_key: &str,
        model: &str,
        instructions: &str,
    ) -> Result<(mpsc::Sender<RealtimeCommand>, mpsc::Receiver<RealtimeEvent>), LlmError> {
        let endpoint = format!("{}?model={}", url, model);
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| LlmError::Stream(e.to_string()))?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", api_key)
                .parse()
                .map_err(|_| LlmError::Stream("invalid api key header".to_string()))?,
        );
        request.headers_mut().insert(
            "OpenAI-Beta",
            "realtime=v1"
                .parse()
                .map_err(|_| LlmError::Stream("invalid beta header".to_string()))?,
        );

        let (mut ws, _) = connect_async(request)
            .await
            .map_err(|e| LlmError::Stream(e.to_string()))?;

        ws.send(WsMessage::Text(session_update(instructions).to_string()))
            .await
            .map_err(|e| LlmError::Stream(e.to_string()))?;

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<RealtimeCommand>(64);
        let (event_tx, event_rx) = mpsc::channel::<RealtimeEvent>(64);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break };
                        if matches!(cmd, RealtimeCommand::Close) {
                            break;
                        }
                        let Some(json) = encode_command(&cmd) else { continue };
                        if let Err(e) = ws.send(WsMessage::Text(json.to_string())).await {
                            tracing::warn!(error = %e, "realtime send failed");
                            break;
                        }
                    }
                    msg = ws.next() => {
                        match msg {
                            Some(Ok(WsMessage::Text(text))) => {
                                if let Some(event) = decode_event(&text) {
                                    if event_tx.send(event).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "realtime stream error");
                                let _ = event_tx
                                    .send(RealtimeEvent::Error(e.to_string()))
                                    .await;
                                break;
                            }
                        }
                    }
                }
            }
            let _ = ws.close(None).await;
        });

        Ok((cmd_tx, event_rx))
    }
}
