//! End-to-end turn-taking flows against the session state machine and
//! the session actor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use dialagent_config::PersonaConfig;
use dialagent_core::{CallId, CallPhase, Speaker, UtteranceId};
use dialagent_engine::{
    spawn_session, CallSession, EngineError, HangupReason, SessionAction, SessionConfig,
    SessionEvent, SessionMode, Step,
};
use dialagent_llm::{ChatModel, GeneratorConfig, LlmError, Message, TurnGenerator};

fn persona() -> PersonaConfig {
    PersonaConfig::default()
}

fn webhook_session() -> CallSession {
    CallSession::new(CallId::new("CA-test"), persona(), SessionConfig::default())
}

fn keyword_gated_session() -> CallSession {
    let mut p = persona();
    p.keyword_gated_barge_in = true;
    CallSession::new(CallId::new("CA-test"), p, SessionConfig::default())
}

fn spoken_utterance_id(step: &Step) -> Option<UtteranceId> {
    step.actions.iter().find_map(|a| match a {
        SessionAction::Speak {
            utterance_id: Some(id),
            ..
        } => Some(*id),
        _ => None,
    })
}

fn generation_id(step: &Step) -> Option<u64> {
    step.actions.iter().find_map(|a| match a {
        SessionAction::Generate { generation_id } => Some(*generation_id),
        _ => None,
    })
}

/// Drive one human turn up to the point where the agent is speaking.
fn complete_exchange(session: &mut CallSession, human: &str, reply: &str) -> UtteranceId {
    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: human.to_string(),
    });
    let gen_id = generation_id(&step).expect("speech should start a generation");
    assert_eq!(session.context().phase(), CallPhase::GeneratingReply);

    let step = session.handle_event(SessionEvent::ReplyReady {
        generation_id: gen_id,
        text: reply.to_string(),
        fallback: false,
    });
    assert_eq!(session.context().phase(), CallPhase::SpeakingReply);
    spoken_utterance_id(&step).expect("generated reply should carry an utterance id")
}

#[test]
fn test_happy_path_two_exchanges() {
    let mut session = webhook_session();

    let step = session.handle_event(SessionEvent::Answered);
    assert_eq!(session.context().phase(), CallPhase::AwaitingHumanSpeech);
    assert!(matches!(
        step.actions[0],
        SessionAction::Speak { utterance_id: None, .. }
    ));
    assert!(step.actions.contains(&SessionAction::Listen));

    let utt = complete_exchange(&mut session, "hi, who is this?", "This is Alex!");
    session.handle_event(SessionEvent::PlaybackFinished { utterance_id: utt });
    assert_eq!(session.context().phase(), CallPhase::AwaitingHumanSpeech);

    let utt = complete_exchange(&mut session, "what do you want?", "Just a quick question.");
    session.handle_event(SessionEvent::PlaybackFinished { utterance_id: utt });
    assert_eq!(session.context().phase(), CallPhase::AwaitingHumanSpeech);

    // Transcript alternates and is complete.
    let texts: Vec<(Speaker, &str)> = session
        .context()
        .turns()
        .iter()
        .map(|t| (t.speaker, t.text.as_str()))
        .collect();
    assert_eq!(
        texts,
        vec![
            (Speaker::Agent, persona().opening_line.as_str()),
            (Speaker::Human, "hi, who is this?"),
            (Speaker::Agent, "This is Alex!"),
            (Speaker::Human, "what do you want?"),
            (Speaker::Agent, "Just a quick question."),
        ]
    );
}

#[test]
fn test_closing_phrase_ends_the_call() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);

    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: "no thanks, goodbye".to_string(),
    });

    assert_eq!(session.context().phase(), CallPhase::Ended);
    assert!(matches!(
        step.actions.last(),
        Some(SessionAction::EndCall { farewell: Some(_) })
    ));
    // The farewell is on the transcript.
    let last = session.context().turns().last().unwrap();
    assert_eq!(last.speaker, Speaker::Agent);
    assert_eq!(last.text, persona().closing_line);
}

#[test]
fn test_barge_in_interrupts_playback() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);
    let utt = complete_exchange(&mut session, "tell me everything", "Well, it all began...");

    // Human cuts in before playback finishes.
    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: "actually, hold that thought".to_string(),
    });

    assert!(step
        .actions
        .contains(&SessionAction::Interrupt { utterance_id: utt }));
    assert!(generation_id(&step).is_some());
    assert_eq!(session.context().phase(), CallPhase::GeneratingReply);

    // The late playback-finished for the interrupted utterance is a no-op.
    let step = session.handle_event(SessionEvent::PlaybackFinished { utterance_id: utt });
    assert!(step.actions.is_empty());
    assert_eq!(session.context().phase(), CallPhase::GeneratingReply);
}

#[test]
fn test_keyword_gated_barge_in() {
    let mut session = keyword_gated_session();
    session.handle_event(SessionEvent::Answered);
    complete_exchange(&mut session, "go on", "Let me explain the details...");

    // Backchannel without a keyword: agent keeps the floor, nothing is
    // recorded.
    let turns_before = session.context().turns().len();
    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: "uh huh, sure".to_string(),
    });
    assert!(step.actions.is_empty());
    assert_eq!(session.context().phase(), CallPhase::SpeakingReply);
    assert_eq!(session.context().turns().len(), turns_before);

    // A keyword cuts the agent off.
    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: "wait, I have a question".to_string(),
    });
    assert!(step
        .actions
        .iter()
        .any(|a| matches!(a, SessionAction::Interrupt { .. })));
    assert_eq!(session.context().phase(), CallPhase::GeneratingReply);
}

#[test]
fn test_stale_reply_is_dropped() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);

    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: "first question".to_string(),
    });
    let first_gen = generation_id(&step).unwrap();

    // New speech supersedes the in-flight generation.
    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: "wait, different question".to_string(),
    });
    assert!(step.actions.contains(&SessionAction::CancelGeneration));
    let second_gen = generation_id(&step).unwrap();
    assert_ne!(first_gen, second_gen);

    // The superseded reply arrives anyway and must not be spoken.
    let step = session.handle_event(SessionEvent::ReplyReady {
        generation_id: first_gen,
        text: "answer to the first question".to_string(),
        fallback: false,
    });
    assert!(step.actions.is_empty());
    assert_eq!(session.context().phase(), CallPhase::GeneratingReply);

    // The current one is.
    let step = session.handle_event(SessionEvent::ReplyReady {
        generation_id: second_gen,
        text: "answer to the second".to_string(),
        fallback: false,
    });
    assert!(spoken_utterance_id(&step).is_some());
}

#[test]
fn test_fallback_reply_is_still_spoken() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);

    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: "hello?".to_string(),
    });
    let gen_id = generation_id(&step).unwrap();

    let step = session.handle_event(SessionEvent::ReplyReady {
        generation_id: gen_id,
        text: persona().fallback_line.clone(),
        fallback: true,
    });

    // A failed generation degrades to the fallback line, never a
    // dropped call.
    assert!(spoken_utterance_id(&step).is_some());
    assert_eq!(session.context().phase(), CallPhase::SpeakingReply);
    let last = session.context().turns().last().unwrap();
    assert_eq!(last.text, persona().fallback_line);
}

#[test]
fn test_repeated_silence_ends_the_call() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);

    // Two silences get a re-prompt.
    for _ in 0..2 {
        let step = session.handle_event(SessionEvent::HumanSpeech {
            text: "  ".to_string(),
        });
        assert!(matches!(
            step.actions[0],
            SessionAction::Speak { utterance_id: None, .. }
        ));
        assert_eq!(session.context().phase(), CallPhase::AwaitingHumanSpeech);
    }

    // The third ends the call.
    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: String::new(),
    });
    assert!(matches!(
        step.actions.last(),
        Some(SessionAction::EndCall { .. })
    ));
    assert_eq!(session.context().phase(), CallPhase::Ended);
}

#[test]
fn test_speech_resets_the_silence_counter() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);

    session.handle_event(SessionEvent::HumanSpeech {
        text: String::new(),
    });
    session.handle_event(SessionEvent::HumanSpeech {
        text: String::new(),
    });
    let utt = complete_exchange(&mut session, "sorry, I'm here", "No problem at all.");
    session.handle_event(SessionEvent::PlaybackFinished { utterance_id: utt });

    // Counter restarted; two more silences re-prompt instead of ending.
    session.handle_event(SessionEvent::HumanSpeech {
        text: String::new(),
    });
    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: String::new(),
    });
    assert!(!matches!(
        step.actions.last(),
        Some(SessionAction::EndCall { .. })
    ));
    assert_eq!(session.context().phase(), CallPhase::AwaitingHumanSpeech);
}

#[test]
fn test_hangup_during_generation_cancels_it() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);
    session.handle_event(SessionEvent::HumanSpeech {
        text: "one moment".to_string(),
    });
    assert_eq!(session.context().phase(), CallPhase::GeneratingReply);

    let step = session.handle_event(SessionEvent::Hangup {
        reason: HangupReason::Requested,
    });
    assert!(step.actions.contains(&SessionAction::CancelGeneration));
    assert_eq!(session.context().phase(), CallPhase::Ended);
}

#[test]
fn test_ended_call_absorbs_all_events() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);
    session.handle_event(SessionEvent::Hangup {
        reason: HangupReason::Provider,
    });
    assert_eq!(session.context().phase(), CallPhase::Ended);

    let transcript_len = session.context().turns().len();
    for event in [
        SessionEvent::Answered,
        SessionEvent::HumanSpeech {
            text: "hello?".to_string(),
        },
        SessionEvent::ReplyReady {
            generation_id: 99,
            text: "late".to_string(),
            fallback: false,
        },
        SessionEvent::SpeechStarted,
        SessionEvent::Hangup {
            reason: HangupReason::Requested,
        },
    ] {
        let step = session.handle_event(event);
        assert!(step.actions.is_empty());
    }
    // Ended never un-ends and the transcript is untouched.
    assert_eq!(session.context().phase(), CallPhase::Ended);
    assert_eq!(session.context().turns().len(), transcript_len);
}

#[test]
fn test_transcript_grows_append_only() {
    let mut session = webhook_session();
    session.handle_event(SessionEvent::Answered);

    let mut previous: Vec<String> = Vec::new();
    let mut check_prefix = |session: &CallSession| {
        let current: Vec<String> = session
            .context()
            .turns()
            .iter()
            .map(|t| t.text.clone())
            .collect();
        assert!(current.len() >= previous.len());
        assert_eq!(&current[..previous.len()], previous.as_slice());
        previous = current;
    };

    check_prefix(&session);
    let utt = complete_exchange(&mut session, "hello", "Hi!");
    check_prefix(&session);
    session.handle_event(SessionEvent::PlaybackFinished { utterance_id: utt });
    check_prefix(&session);
    session.handle_event(SessionEvent::HumanSpeech {
        text: "ok goodbye".to_string(),
    });
    check_prefix(&session);
}

#[test]
fn test_streaming_mode_tracks_the_model() {
    let mut session = CallSession::new(
        CallId::new("CA-stream"),
        persona(),
        SessionConfig {
            mode: SessionMode::Streaming,
            max_no_input_timeouts: 3,
        },
    );
    session.handle_event(SessionEvent::Answered);

    // Human speaks; no generation is started, the model replies itself.
    let step = session.handle_event(SessionEvent::HumanSpeech {
        text: "hello there".to_string(),
    });
    assert!(step.actions.is_empty());
    assert_eq!(session.context().phase(), CallPhase::AwaitingHumanSpeech);

    // Model response streaming.
    session.handle_event(SessionEvent::AgentSpeaking);
    assert_eq!(session.context().phase(), CallPhase::SpeakingReply);

    // Voice activity interrupts in full mode.
    let step = session.handle_event(SessionEvent::SpeechStarted);
    assert!(step
        .actions
        .iter()
        .any(|a| matches!(a, SessionAction::Interrupt { .. })));
    assert_eq!(session.context().phase(), CallPhase::AwaitingHumanSpeech);

    // Partial transcript of the cut-off response still lands.
    session.handle_event(SessionEvent::AgentUtterance {
        text: "As I was say".to_string(),
    });
    assert_eq!(
        session.context().turns().last().unwrap().text,
        "As I was say"
    );

    // Stream teardown ends the call and hangs up the provider leg,
    // which would otherwise sit in dead air until its document ran out.
    let step = session.handle_event(SessionEvent::StreamClosed);
    assert!(step
        .actions
        .contains(&SessionAction::EndCall { farewell: None }));
    assert_eq!(session.context().phase(), CallPhase::Ended);
}

#[test]
fn test_streaming_voice_activity_without_playback_is_a_no_op() {
    let mut session = CallSession::new(
        CallId::new("CA-stream"),
        persona(),
        SessionConfig {
            mode: SessionMode::Streaming,
            max_no_input_timeouts: 3,
        },
    );
    session.handle_event(SessionEvent::Answered);

    let step = session.handle_event(SessionEvent::SpeechStarted);
    assert!(step.actions.is_empty());
    assert_eq!(session.context().phase(), CallPhase::AwaitingHumanSpeech);
}

// Actor-level tests: the event queue, deferred webhook replies and
// generation cancellation.

struct Scripted(&'static str);

#[async_trait]
impl ChatModel for Scripted {
    async fn complete(&self, _: &[Message], _: u32) -> Result<String, LlmError> {
        Ok(self.0.to_string())
    }
}

struct Stalled;

#[async_trait]
impl ChatModel for Stalled {
    async fn complete(&self, _: &[Message], _: u32) -> Result<String, LlmError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("never".to_string())
    }
}

fn spawn_with(
    model: Arc<dyn ChatModel>,
) -> (
    dialagent_engine::SessionHandle,
    mpsc::Receiver<SessionAction>,
) {
    let generator = Arc::new(TurnGenerator::new(
        model,
        persona(),
        GeneratorConfig::default(),
    ));
    let (action_tx, action_rx) = mpsc::channel(16);
    let handle = spawn_session(
        CallId::new("CA-actor"),
        persona(),
        SessionConfig::default(),
        generator,
        action_tx,
    );
    (handle, action_rx)
}

#[tokio::test]
async fn test_actor_defers_reply_until_generated() {
    let (handle, _actions) = spawn_with(Arc::new(Scripted("Happy to help.")));

    handle.request(SessionEvent::Answered).await.unwrap();

    let step = handle
        .request(SessionEvent::HumanSpeech {
            text: "can you help me?".to_string(),
        })
        .await
        .unwrap();

    // The response arrives only once generation finished, carrying the
    // spoken reply.
    assert!(step.actions.iter().any(|a| matches!(
        a,
        SessionAction::Speak { text, utterance_id: Some(_) } if text == "Happy to help."
    )));
    assert_eq!(handle.phase(), CallPhase::SpeakingReply);
}

#[tokio::test(start_paused = true)]
async fn test_actor_hangup_is_not_blocked_by_generation() {
    let (handle, _actions) = spawn_with(Arc::new(Stalled));

    handle.request(SessionEvent::Answered).await.unwrap();
    handle
        .dispatch(SessionEvent::HumanSpeech {
            text: "think about it".to_string(),
        })
        .await
        .unwrap();

    // Generation is stalled, but the hangup goes through immediately.
    handle
        .dispatch(SessionEvent::Hangup {
            reason: HangupReason::Requested,
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.phase(), CallPhase::Ended);
}

#[tokio::test]
async fn test_handle_rejects_events_after_the_call_ends() {
    let (handle, _actions) = spawn_with(Arc::new(Scripted("Hello!")));

    handle.request(SessionEvent::Answered).await.unwrap();
    handle
        .request(SessionEvent::Hangup {
            reason: HangupReason::Requested,
        })
        .await
        .unwrap();
    assert!(handle.is_ended());

    let err = handle
        .dispatch(SessionEvent::HumanSpeech {
            text: "hello?".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::SessionEnded(id) if id == CallId::new("CA-actor")
    ));

    let err = handle.request(SessionEvent::Answered).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionEnded(_)));
}

#[tokio::test]
async fn test_actor_snapshot_tracks_transcript() {
    let (handle, _actions) = spawn_with(Arc::new(Scripted("Hello!")));

    handle.request(SessionEvent::Answered).await.unwrap();
    handle
        .request(SessionEvent::HumanSpeech {
            text: "hi".to_string(),
        })
        .await
        .unwrap();

    let turns = handle.turns();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1].text, "hi");
    assert_eq!(turns[2].text, "Hello!");
}
