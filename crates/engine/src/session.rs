//! Call session state machine and actor
//!
//! [`CallSession`] is the pure turn-taking machine: it consumes one
//! [`SessionEvent`] at a time and returns the [`SessionAction`]s the
//! outer layers must perform. It never does I/O, which keeps every
//! transition unit-testable.
//!
//! [`spawn_session`] wraps one `CallSession` in a task that owns a
//! single-consumer event queue. All events for a call flow through
//! that queue, so concurrent webhooks, stream frames and API calls
//! are serialized without locks. Reply generation runs as a separate
//! cancellable task that posts its result back into the same queue,
//! so barge-in and hangup events are never blocked behind a slow
//! model call.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use dialagent_config::PersonaConfig;
use dialagent_core::{CallId, CallPhase, Turn, UtteranceId};
use dialagent_llm::TurnGenerator;

use crate::barge_in::{BargeInController, BargeInDecision, SpeechSignal};
use crate::context::ConversationContext;
use crate::EngineError;

/// How turn-taking is driven for this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Provider webhooks carry transcribed turns; we answer each with
    /// speak/listen instructions.
    Webhook,
    /// A duplex audio stream carries the call; the model speaks for
    /// itself and we track state from stream events.
    Streaming,
}

/// Why a call is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangupReason {
    /// Explicit request through our API
    Requested,
    /// Provider reported the call over (hung up, failed, busy)
    Provider,
    /// Too many consecutive no-input timeouts
    NoInput,
    /// The human said a closing phrase
    Closing,
    /// Evicted by the registry after the idle timeout
    Expired,
}

/// One event on a call's queue.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The outbound call was answered
    Answered,
    /// Transcribed human speech; empty text is a no-input timeout
    HumanSpeech { text: String },
    /// A generation task finished
    ReplyReady {
        generation_id: u64,
        text: String,
        fallback: bool,
    },
    /// The provider finished playing an agent utterance
    PlaybackFinished { utterance_id: UtteranceId },
    /// Voice activity detected on the inbound audio (streaming)
    SpeechStarted,
    /// The model began streaming a spoken response (streaming)
    AgentSpeaking,
    /// Final transcript of one model response (streaming)
    AgentUtterance { text: String },
    /// The media stream closed (streaming)
    StreamClosed,
    /// End the call
    Hangup { reason: HangupReason },
}

/// Instruction to the outer layers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Speak `text`; `utterance_id` is set for generated replies whose
    /// playback completion we track, and absent for fixed lines.
    Speak {
        text: String,
        utterance_id: Option<UtteranceId>,
    },
    /// Collect human speech
    Listen,
    /// Start a generation task for the current transcript
    Generate { generation_id: u64 },
    /// Cancel the in-flight generation task
    CancelGeneration,
    /// Cut agent playback short
    Interrupt { utterance_id: UtteranceId },
    /// Terminate the call, optionally speaking a farewell first
    EndCall { farewell: Option<String> },
}

/// Result of processing one event.
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub actions: Vec<SessionAction>,
}

impl Step {
    fn none() -> Self {
        Self::default()
    }

    fn with(actions: Vec<SessionAction>) -> Self {
        Self { actions }
    }

    /// Does this step start a generation, deferring the reply?
    pub fn awaits_generation(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, SessionAction::Generate { .. }))
    }
}

/// Session policy knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: SessionMode,
    pub max_no_input_timeouts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::Webhook,
            max_no_input_timeouts: 3,
        }
    }
}

/// The turn-taking state machine for one call.
pub struct CallSession {
    context: ConversationContext,
    persona: PersonaConfig,
    barge_in: BargeInController,
    config: SessionConfig,
    generation_seq: u64,
}

impl CallSession {
    pub fn new(call_id: CallId, persona: PersonaConfig, config: SessionConfig) -> Self {
        let barge_in = BargeInController::from_persona(&persona);
        Self {
            context: ConversationContext::new(call_id),
            persona,
            barge_in,
            config,
            generation_seq: 0,
        }
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Process one event and return the actions it requires.
    pub fn handle_event(&mut self, event: SessionEvent) -> Step {
        if self.context.phase().is_terminal() {
            tracing::debug!(call_id = %self.context.call_id(), ?event, "event after call end ignored");
            return Step::none();
        }

        let step = match event {
            SessionEvent::Answered => self.on_answered(),
            SessionEvent::HumanSpeech { text } => self.on_human_speech(&text),
            SessionEvent::ReplyReady {
                generation_id,
                text,
                fallback,
            } => self.on_reply_ready(generation_id, text, fallback),
            SessionEvent::PlaybackFinished { utterance_id } => {
                self.on_playback_finished(utterance_id)
            }
            SessionEvent::SpeechStarted => self.on_speech_started(),
            SessionEvent::AgentSpeaking => self.on_agent_speaking(),
            SessionEvent::AgentUtterance { text } => self.on_agent_utterance(text),
            SessionEvent::StreamClosed => self.on_stream_closed(),
            SessionEvent::Hangup { reason } => self.on_hangup(reason),
        };

        debug_assert!(self.context.is_consistent());
        step
    }

    fn on_answered(&mut self) -> Step {
        if self.context.phase() != CallPhase::NotStarted {
            return Step::none();
        }

        let opening = self.persona.opening_line.clone();
        self.context.push_agent(&opening);
        self.context.set_phase(CallPhase::AwaitingHumanSpeech);

        tracing::info!(call_id = %self.context.call_id(), "call answered");
        Step::with(vec![
            SessionAction::Speak {
                text: opening,
                utterance_id: None,
            },
            SessionAction::Listen,
        ])
    }

    fn on_human_speech(&mut self, text: &str) -> Step {
        let text = text.trim();

        if self.config.mode == SessionMode::Streaming {
            // The model answers for itself over the stream; we only
            // keep the transcript and watch for closing phrases.
            if text.is_empty() {
                return Step::none();
            }
            self.context.reset_no_input();
            self.context.push_human(text);
            if self.persona.matches_closing_phrase(text) {
                return self.close_call(HangupReason::Closing);
            }
            return Step::none();
        }

        if text.is_empty() {
            return self.on_no_input();
        }

        let mut actions = Vec::new();

        match self.context.phase() {
            CallPhase::SpeakingReply => {
                match self.barge_in.decide(SpeechSignal::Transcript(text)) {
                    BargeInDecision::Interrupt => {
                        if let Some(id) = self.context.interrupt_utterance() {
                            tracing::debug!(call_id = %self.context.call_id(), utterance_id = %id, "barge-in");
                            actions.push(SessionAction::Interrupt { utterance_id: id });
                        }
                    }
                    BargeInDecision::Ignore => {
                        tracing::debug!(call_id = %self.context.call_id(), "speech during playback ignored (keyword gate)");
                        return Step::none();
                    }
                }
            }
            CallPhase::GeneratingReply => {
                // New speech supersedes the reply being generated.
                actions.push(SessionAction::CancelGeneration);
                self.context.set_phase(CallPhase::AwaitingHumanSpeech);
            }
            _ => {}
        }

        self.context.reset_no_input();
        self.context.push_human(text);

        if self.persona.matches_closing_phrase(text) {
            let mut step = self.close_call(HangupReason::Closing);
            actions.append(&mut step.actions);
            return Step::with(actions);
        }

        self.generation_seq += 1;
        self.context.set_phase(CallPhase::GeneratingReply);
        actions.push(SessionAction::Generate {
            generation_id: self.generation_seq,
        });
        Step::with(actions)
    }

    fn on_no_input(&mut self) -> Step {
        if self.context.phase() == CallPhase::SpeakingReply {
            // A speech timeout can only be reported once playback is
            // over, so the pending utterance has finished by now.
            self.context.interrupt_utterance();
        }
        if self.context.phase() != CallPhase::AwaitingHumanSpeech {
            return Step::none();
        }

        let count = self.context.record_no_input();
        if count >= self.config.max_no_input_timeouts {
            tracing::info!(call_id = %self.context.call_id(), count, "giving up after repeated silence");
            return self.close_call(HangupReason::NoInput);
        }

        Step::with(vec![
            SessionAction::Speak {
                text: self.persona.reprompt_line.clone(),
                utterance_id: None,
            },
            SessionAction::Listen,
        ])
    }

    fn on_reply_ready(&mut self, generation_id: u64, text: String, fallback: bool) -> Step {
        if generation_id != self.generation_seq {
            tracing::debug!(call_id = %self.context.call_id(), generation_id, "stale reply dropped");
            return Step::none();
        }
        if self.context.phase() != CallPhase::GeneratingReply {
            return Step::none();
        }

        if fallback {
            tracing::warn!(call_id = %self.context.call_id(), "speaking fallback line");
        }

        self.context.push_agent(&text);
        let id = self.context.begin_utterance();
        Step::with(vec![
            SessionAction::Speak {
                text,
                utterance_id: Some(id),
            },
            SessionAction::Listen,
        ])
    }

    fn on_playback_finished(&mut self, utterance_id: UtteranceId) -> Step {
        if self.context.finish_utterance(utterance_id) {
            Step::with(vec![SessionAction::Listen])
        } else {
            // Interrupted or already completed; nothing to do.
            Step::none()
        }
    }

    fn on_speech_started(&mut self) -> Step {
        if self.context.pending_utterance().is_none() {
            return Step::none();
        }
        match self.barge_in.decide(SpeechSignal::VoiceActivity) {
            BargeInDecision::Interrupt => match self.context.interrupt_utterance() {
                Some(id) => Step::with(vec![SessionAction::Interrupt { utterance_id: id }]),
                None => Step::none(),
            },
            BargeInDecision::Ignore => Step::none(),
        }
    }

    fn on_agent_speaking(&mut self) -> Step {
        self.context.begin_utterance();
        Step::none()
    }

    fn on_agent_utterance(&mut self, text: String) -> Step {
        // Appended even after an interrupt: it is what was actually
        // spoken before the cutoff.
        if !text.trim().is_empty() {
            self.context.push_agent(text.trim());
        }
        if self.context.pending_utterance().is_some() {
            self.context.set_phase(CallPhase::AwaitingHumanSpeech);
        }
        Step::none()
    }

    fn on_stream_closed(&mut self) -> Step {
        tracing::info!(call_id = %self.context.call_id(), "media stream closed");
        let mut actions = Vec::new();
        if self.context.phase() == CallPhase::GeneratingReply {
            actions.push(SessionAction::CancelGeneration);
        }
        self.context.set_phase(CallPhase::Ended);
        // The provider leg is still parked on the stream; hang it up
        // rather than leave dead air.
        actions.push(SessionAction::EndCall { farewell: None });
        Step::with(actions)
    }

    fn on_hangup(&mut self, reason: HangupReason) -> Step {
        let mut actions = Vec::new();
        if self.context.phase() == CallPhase::GeneratingReply {
            actions.push(SessionAction::CancelGeneration);
        }

        match reason {
            HangupReason::Provider => {
                self.context.set_phase(CallPhase::Ended);
                tracing::info!(call_id = %self.context.call_id(), "call ended by provider");
                Step::with(actions)
            }
            HangupReason::Expired => {
                // No farewell; nobody has spoken for the whole idle
                // window, but the provider leg still needs hanging up.
                self.context.set_phase(CallPhase::Ended);
                tracing::info!(call_id = %self.context.call_id(), "idle call expired");
                actions.push(SessionAction::EndCall { farewell: None });
                Step::with(actions)
            }
            reason => {
                let mut step = self.close_call(reason);
                actions.append(&mut step.actions);
                Step::with(actions)
            }
        }
    }

    /// End the call from our side, speaking the closing line.
    fn close_call(&mut self, reason: HangupReason) -> Step {
        let farewell = self.persona.closing_line.clone();
        self.context.push_agent(&farewell);
        self.context.set_phase(CallPhase::Ended);
        tracing::info!(call_id = %self.context.call_id(), ?reason, "call ending");
        Step::with(vec![SessionAction::EndCall {
            farewell: Some(farewell),
        }])
    }
}

/// Read-only view of a session, kept current by the actor task.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: CallPhase,
    pub turns: Vec<Turn>,
}

struct SessionCommand {
    event: SessionEvent,
    respond: Option<oneshot::Sender<Step>>,
}

/// Cloneable handle to one session actor.
#[derive(Clone)]
pub struct SessionHandle {
    call_id: CallId,
    cmd_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    last_activity: Arc<Mutex<Instant>>,
}

impl SessionHandle {
    /// Queue an event without waiting for the resulting actions.
    pub async fn dispatch(&self, event: SessionEvent) -> Result<(), EngineError> {
        if self.is_ended() {
            return Err(EngineError::SessionEnded(self.call_id.clone()));
        }
        self.touch();
        self.cmd_tx
            .send(SessionCommand {
                event,
                respond: None,
            })
            .await
            .map_err(|_| EngineError::SessionClosed)
    }

    /// Queue an event and wait for the actions it produces.
    ///
    /// When the event starts a generation, the reply is deferred until
    /// the generation task posts its result back; the returned step
    /// then carries the speak instruction.
    pub async fn request(&self, event: SessionEvent) -> Result<Step, EngineError> {
        if self.is_ended() {
            return Err(EngineError::SessionEnded(self.call_id.clone()));
        }
        self.touch();
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand {
                event,
                respond: Some(tx),
            })
            .await
            .map_err(|_| EngineError::SessionClosed)?;
        rx.await.map_err(|_| EngineError::SessionClosed)
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn phase(&self) -> CallPhase {
        self.snapshot.read().phase
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.snapshot.read().turns.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.phase().is_terminal()
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }
}

/// Start the actor task for one call and return its handle.
///
/// `action_tx` receives the actions of events queued via
/// [`SessionHandle::dispatch`]; actions for [`SessionHandle::request`]
/// events go to the caller instead.
pub fn spawn_session(
    call_id: CallId,
    persona: PersonaConfig,
    config: SessionConfig,
    generator: Arc<TurnGenerator>,
    action_tx: mpsc::Sender<SessionAction>,
) -> SessionHandle {
    let session = CallSession::new(call_id.clone(), persona, config);
    let snapshot = Arc::new(RwLock::new(SessionSnapshot {
        phase: session.context().phase(),
        turns: Vec::new(),
    }));
    let (cmd_tx, cmd_rx) = mpsc::channel(32);

    let handle = SessionHandle {
        call_id,
        cmd_tx: cmd_tx.clone(),
        snapshot: snapshot.clone(),
        last_activity: Arc::new(Mutex::new(Instant::now())),
    };

    tokio::spawn(run_actor(session, cmd_rx, cmd_tx, snapshot, generator, action_tx));

    handle
}

async fn run_actor(
    mut session: CallSession,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    cmd_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    generator: Arc<TurnGenerator>,
    action_tx: mpsc::Sender<SessionAction>,
) {
    // Responder of a webhook whose reply is still being generated.
    let mut parked: Option<oneshot::Sender<Step>> = None;
    let mut generation: Option<CancellationToken> = None;

    while let Some(cmd) = cmd_rx.recv().await {
        let step = session.handle_event(cmd.event);

        {
            let mut snap = snapshot.write();
            snap.phase = session.context().phase();
            snap.turns = session.context().turns().to_vec();
        }

        for action in &step.actions {
            match action {
                SessionAction::Generate { generation_id } => {
                    if let Some(token) = generation.take() {
                        token.cancel();
                    }
                    let token = CancellationToken::new();
                    generation = Some(token.clone());
                    let generation_id = *generation_id;
                    let turns = session.context().turns().to_vec();
                    let generator = generator.clone();
                    let cmd_tx = cmd_tx.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {
                                tracing::debug!(generation_id, "generation cancelled");
                            }
                            reply = generator.generate(&turns) => {
                                let _ = cmd_tx
                                    .send(SessionCommand {
                                        event: SessionEvent::ReplyReady {
                                            generation_id,
                                            text: reply.text,
                                            fallback: reply.fallback,
                                        },
                                        respond: None,
                                    })
                                    .await;
                            }
                        }
                    });
                }
                SessionAction::CancelGeneration => {
                    if let Some(token) = generation.take() {
                        token.cancel();
                    }
                }
                _ => {}
            }
        }

        let ended = session.context().phase().is_terminal();

        match cmd.respond {
            Some(tx) => {
                if step.awaits_generation() {
                    // Answer a superseded webhook so its connection is
                    // not left hanging; the new one takes over.
                    if let Some(old) = parked.replace(tx) {
                        let _ = old.send(Step::with(vec![SessionAction::Listen]));
                    }
                } else {
                    let _ = tx.send(step);
                }
            }
            None => {
                let deliverable = !step.actions.is_empty() && !step.awaits_generation();
                if deliverable {
                    if let Some(tx) = parked.take() {
                        let _ = tx.send(step);
                    } else {
                        for action in step.actions {
                            if action_tx.send(action).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        if ended {
            if let Some(tx) = parked.take() {
                let _ = tx.send(Step::with(vec![SessionAction::EndCall { farewell: None }]));
            }
            if let Some(token) = generation.take() {
                token.cancel();
            }
            break;
        }
    }
}
