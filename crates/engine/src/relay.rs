//! Media relay
//!
//! Pumps audio between the telephony media stream and the realtime
//! model stream for one call, translating stream events into session
//! events along the way. The relay owns no sockets; both sides are
//! channels, so the whole pump is testable in-process.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use dialagent_core::{TranscriptEntry, Turn};
use dialagent_llm::{RealtimeCommand, RealtimeEvent};
use dialagent_telephony::MediaStreamMessage;

use crate::session::{SessionEvent, SessionHandle};

/// Control messages from the session side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayControl {
    /// Drop buffered playback audio and cancel the in-flight response
    BargeIn,
    /// Stop the relay
    Shutdown,
}

/// Relay policy knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Close the relay after this long without traffic on either side
    pub idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Run the pump until either side closes, a shutdown is requested, or
/// the idle timeout fires. Completed human and agent utterances are
/// broadcast on `feed` as they land. Posts
/// [`SessionEvent::StreamClosed`] on the way out.
#[allow(clippy::too_many_arguments)]
pub async fn run_relay(
    session: SessionHandle,
    config: RelayConfig,
    feed: broadcast::Sender<TranscriptEntry>,
    mut from_phone: mpsc::Receiver<MediaStreamMessage>,
    to_phone: mpsc::Sender<MediaStreamMessage>,
    model_cmd: mpsc::Sender<RealtimeCommand>,
    mut model_events: mpsc::Receiver<RealtimeEvent>,
    mut control: mpsc::Receiver<RelayControl>,
) {
    let mut stream_sid: Option<String> = None;
    // Accumulates the agent transcript of the in-flight response.
    let mut agent_transcript = String::new();

    loop {
        let idle = tokio::time::sleep(config.idle_timeout);
        tokio::pin!(idle);

        tokio::select! {
            frame = from_phone.recv() => {
                match frame {
                    Some(MediaStreamMessage::Start { stream_sid: sid, .. }) => {
                        tracing::info!(stream_sid = %sid, "media stream started");
                        stream_sid = Some(sid);
                    }
                    Some(msg @ MediaStreamMessage::Media { .. }) => {
                        if let Some(bytes) = msg.decode_payload() {
                            if model_cmd.send(RealtimeCommand::AppendAudio(bytes)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(MediaStreamMessage::Stop) | None => break,
                    Some(_) => {}
                }
            }
            event = model_events.recv() => {
                match event {
                    Some(RealtimeEvent::AudioDelta(bytes)) => {
                        let frame = MediaStreamMessage::media_from_bytes(stream_sid.clone(), &bytes);
                        if to_phone.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Some(RealtimeEvent::SpeechStarted) => {
                        let _ = session.dispatch(SessionEvent::SpeechStarted).await;
                    }
                    Some(RealtimeEvent::SpeechStopped) => {}
                    Some(RealtimeEvent::ResponseStarted) => {
                        agent_transcript.clear();
                        let _ = session.dispatch(SessionEvent::AgentSpeaking).await;
                    }
                    Some(RealtimeEvent::AgentTranscriptDelta(delta)) => {
                        agent_transcript.push_str(&delta);
                    }
                    Some(RealtimeEvent::ResponseDone) => {
                        let text = std::mem::take(&mut agent_transcript);
                        if !text.is_empty() {
                            let turn = Turn::agent(text.clone());
                            let _ = feed.send(TranscriptEntry::from_turn(session.call_id(), &turn));
                        }
                        let _ = session.dispatch(SessionEvent::AgentUtterance { text }).await;
                    }
                    Some(RealtimeEvent::HumanTranscript(text)) => {
                        let turn = Turn::human(text.clone());
                        let _ = feed.send(TranscriptEntry::from_turn(session.call_id(), &turn));
                        let _ = session.dispatch(SessionEvent::HumanSpeech { text }).await;
                    }
                    Some(RealtimeEvent::Error(message)) => {
                        tracing::warn!(%message, "realtime stream error");
                    }
                    None => break,
                }
            }
            ctl = control.recv() => {
                match ctl {
                    Some(RelayControl::BargeIn) => {
                        let _ = to_phone
                            .send(MediaStreamMessage::Clear { stream_sid: stream_sid.clone() })
                            .await;
                        let _ = model_cmd.send(RealtimeCommand::CancelResponse).await;
                    }
                    Some(RelayControl::Shutdown) | None => break,
                }
            }
            _ = &mut idle => {
                tracing::info!("media relay idle timeout");
                break;
            }
        }
    }

    let _ = model_cmd.send(RealtimeCommand::Close).await;
    let _ = session.dispatch(SessionEvent::StreamClosed).await;
}
