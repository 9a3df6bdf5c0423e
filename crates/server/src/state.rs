//! Shared application state

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use dialagent_config::Settings;
use dialagent_core::{CallId, TranscriptEntry};
use dialagent_engine::{
    spawn_session, RelayControl, SessionAction, SessionConfig, SessionHandle, SessionMode,
    SessionRegistry,
};
use dialagent_llm::{ChatClient, GeneratorConfig, TurnGenerator};
use dialagent_telephony::TelephonyClient;

/// Everything the handlers share.
pub struct AppState {
    pub settings: Settings,
    pub registry: SessionRegistry,
    pub telephony: TelephonyClient,
    pub generator: Arc<TurnGenerator>,
    /// Live transcript feed; subscribers come and go.
    pub transcript_feed: broadcast::Sender<TranscriptEntry>,
    /// Control channel of each call's media relay (streaming mode).
    relay_controls: Mutex<HashMap<CallId, mpsc::Sender<RelayControl>>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(settings: Settings) -> SharedState {
        let registry = SessionRegistry::new(
            settings.engine.max_sessions,
            Duration::from_secs(settings.engine.idle_timeout_secs),
        );

        let telephony = TelephonyClient::new(
            settings.telephony.api_base.clone(),
            settings.telephony.account_sid.clone(),
            settings.telephony.auth_token.clone(),
            settings.telephony.from_number.clone(),
        );

        let model = Arc::new(ChatClient::new(
            settings.llm.api_base.clone(),
            settings.llm.api_key.clone(),
            settings.llm.model.clone(),
            settings.llm.temperature,
        ));
        let generator = Arc::new(TurnGenerator::new(
            model,
            settings.persona.clone(),
            GeneratorConfig {
                timeout: Duration::from_millis(settings.engine.generation_timeout_ms),
                max_reply_tokens: settings.engine.max_reply_tokens,
                history_max_exchanges: settings.engine.history_max_exchanges,
                history_char_budget: settings.engine.history_char_budget,
            },
        ));

        let (transcript_feed, _) = broadcast::channel(256);

        Arc::new(Self {
            settings,
            registry,
            telephony,
            generator,
            transcript_feed,
            relay_controls: Mutex::new(HashMap::new()),
        })
    }

    pub fn session_mode(&self) -> SessionMode {
        if self.settings.engine.streaming_enabled {
            SessionMode::Streaming
        } else {
            SessionMode::Webhook
        }
    }

    /// Spawn the session actor for a new call, register it, and attach
    /// the task that carries its unsolicited actions out to the world.
    pub fn start_call_session(
        self: &Arc<Self>,
        call_id: CallId,
    ) -> Result<SessionHandle, dialagent_engine::EngineError> {
        let (action_tx, action_rx) = mpsc::channel(32);
        let handle = spawn_session(
            call_id.clone(),
            self.settings.persona.clone(),
            SessionConfig {
                mode: self.session_mode(),
                max_no_input_timeouts: self.settings.engine.max_no_input_timeouts,
            },
            self.generator.clone(),
            action_tx,
        );
        self.registry.insert(call_id.clone(), handle.clone())?;
        spawn_action_consumer(self.clone(), call_id, action_rx);
        Ok(handle)
    }

    pub fn register_relay(&self, call_id: CallId, control: mpsc::Sender<RelayControl>) {
        self.relay_controls.lock().insert(call_id, control);
    }

    pub fn relay_control(&self, call_id: &CallId) -> Option<mpsc::Sender<RelayControl>> {
        self.relay_controls.lock().get(call_id).cloned()
    }

    pub fn drop_relay(&self, call_id: &CallId) -> Option<mpsc::Sender<RelayControl>> {
        self.relay_controls.lock().remove(call_id)
    }

    /// Publish one transcript line to the live feed.
    pub fn publish(&self, entry: TranscriptEntry) {
        // Send only fails with zero subscribers, which is fine.
        let _ = self.transcript_feed.send(entry);
    }

    pub fn webhook_url(&self) -> String {
        format!("{}/webhook/voice", self.settings.server.external_url)
    }

    pub fn status_callback_url(&self) -> String {
        format!("{}/webhook/status", self.settings.server.external_url)
    }

    pub fn media_stream_url(&self) -> String {
        let ws_base = self
            .settings
            .server
            .external_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!("{}/media", ws_base)
    }
}

/// Carry a session's unsolicited actions to the provider and relay.
///
/// Actions answering a webhook go back in its HTTP response instead;
/// this task only sees the ones produced by dispatched events, which
/// matter in streaming mode (barge-in) and on engine-initiated hangups.
fn spawn_action_consumer(
    state: SharedState,
    call_id: CallId,
    mut action_rx: mpsc::Receiver<SessionAction>,
) {
    tokio::spawn(async move {
        while let Some(action) = action_rx.recv().await {
            match action {
                SessionAction::Interrupt { utterance_id } => {
                    tracing::debug!(call_id = %call_id, utterance_id = %utterance_id, "relaying barge-in");
                    if let Some(control) = state.relay_control(&call_id) {
                        let _ = control.send(RelayControl::BargeIn).await;
                    }
                }
                SessionAction::EndCall { .. } => {
                    if let Err(e) = state.telephony.end_call(call_id.as_str()).await {
                        tracing::warn!(call_id = %call_id, error = %e, "provider hangup failed");
                    }
                    if let Some(control) = state.drop_relay(&call_id) {
                        let _ = control.send(RelayControl::Shutdown).await;
                    }
                }
                other => {
                    tracing::debug!(call_id = %call_id, ?other, "no out-of-band handling for action");
                }
            }
        }
        state.drop_relay(&call_id);
    });
}
