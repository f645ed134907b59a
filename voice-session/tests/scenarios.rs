//! Drives the six end-to-end scenarios against an in-memory transport and
//! provider double instead of a live socket, the way higher-level crates in
//! this codebase test a full flow against a fake transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use voice_protocol::{build_envelope, AudioCodec, AudioFrame, Envelope, EnvelopeType, FrameKind};
use voice_provider::{AssistantState, ItemRole, ProviderEvent};
use voice_session::{RealtimeProvider, SessionConfig, SessionState, Transport, TransportError, VoiceSession};

#[derive(Default)]
struct ProviderCalls {
    start_session: u32,
    commit_input: Vec<bool>,
    clear_input: u32,
    interrupt: Vec<u32>,
    create_text_turn: u32,
    stop_session: u32,
}

struct FakeProvider {
    calls: Arc<Mutex<ProviderCalls>>,
    queued: VecDeque<ProviderEvent>,
}

#[async_trait]
impl RealtimeProvider for FakeProvider {
    async fn start_session(&mut self, _config: &voice_provider::SessionConfig) -> Result<(), voice_provider::Error> {
        self.calls.lock().unwrap().start_session += 1;
        Ok(())
    }

    async fn append_input_audio(&mut self, _pcm16: &[u8]) -> Result<(), voice_provider::Error> {
        Ok(())
    }

    async fn commit_input(&mut self, force_response: bool) -> Result<(), voice_provider::Error> {
        self.calls.lock().unwrap().commit_input.push(force_response);
        Ok(())
    }

    async fn clear_input(&mut self) -> Result<(), voice_provider::Error> {
        self.calls.lock().unwrap().clear_input += 1;
        Ok(())
    }

    async fn interrupt(&mut self, truncate_audio_ms: u32) -> Result<(), voice_provider::Error> {
        self.calls.lock().unwrap().interrupt.push(truncate_audio_ms);
        Ok(())
    }

    async fn create_text_turn(
        &mut self,
        _role: ItemRole,
        _text: &str,
        _create_response: bool,
    ) -> Result<(), voice_provider::Error> {
        self.calls.lock().unwrap().create_text_turn += 1;
        Ok(())
    }

    async fn append_system_context(&mut self, _text: &str) -> Result<(), voice_provider::Error> {
        Ok(())
    }

    async fn stop_session(&mut self) {
        self.calls.lock().unwrap().stop_session += 1;
    }

    async fn recv(&mut self) -> Option<ProviderEvent> {
        self.queued.pop_front()
    }
}

struct RecordingTransport {
    control: Arc<Mutex<Vec<Envelope>>>,
    audio: Arc<Mutex<Vec<AudioFrame>>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_control(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.control.lock().unwrap().push(envelope.clone());
        Ok(())
    }

    async fn send_audio(&self, frame: &AudioFrame) -> Result<(), TransportError> {
        self.audio.lock().unwrap().push(frame.clone());
        Ok(())
    }
}

struct Harness {
    session: VoiceSession,
    control: Arc<Mutex<Vec<Envelope>>>,
    audio: Arc<Mutex<Vec<AudioFrame>>>,
    calls: Arc<Mutex<ProviderCalls>>,
}

fn harness() -> Harness {
    let control = Arc::new(Mutex::new(Vec::new()));
    let audio = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(Mutex::new(ProviderCalls::default()));
    let provider = FakeProvider {
        calls: calls.clone(),
        queued: VecDeque::new(),
    };
    let transport = RecordingTransport {
        control: control.clone(),
        audio: audio.clone(),
    };
    let session = VoiceSession::new(
        "sess-test",
        SessionConfig::default(),
        Box::new(provider),
        Box::new(transport),
        None,
    );
    Harness { session, control, audio, calls }
}

impl Harness {
    fn kinds(&self) -> Vec<EnvelopeType> {
        self.control.lock().unwrap().iter().map(|e| e.kind).collect()
    }

    async fn start(&mut self) {
        let env = build_envelope(EnvelopeType::SessionStart, json!({}), "sess-test", None);
        self.session.start(&env).await.expect("session start");
    }

    async fn commit(&mut self, force_response: bool) {
        let env = build_envelope(
            EnvelopeType::AudioCommit,
            json!({ "force_response": force_response }),
            "sess-test",
            None,
        );
        self.session.on_control(env).await.expect("commit envelope");
    }

    async fn speech_frame(&mut self, seq: u32) {
        let frame = AudioFrame {
            kind: FrameKind::Input,
            codec: AudioCodec::Pcm16,
            channels: 1,
            sample_rate_hz: 24_000,
            seq,
            duration_ms: 20,
            bytes: vec![0x11u8; 960],
        };
        self.session.on_audio(frame).await.expect("speech frame");
    }

    async fn silent_frame(&mut self, seq: u32) {
        let frame = AudioFrame {
            kind: FrameKind::Input,
            codec: AudioCodec::Pcm16,
            channels: 1,
            sample_rate_hz: 24_000,
            seq,
            duration_ms: 20,
            bytes: vec![0u8; 960],
        };
        self.session.on_audio(frame).await.expect("silent frame");
    }
}

/// Asserts `needle` appears as an (not necessarily contiguous) ordered
/// subsequence of `haystack`. A turn's full envelope stream also carries
/// `metrics.tick` checkpoints and a `session.state=speaking` transition that
/// these scenario checks don't bother asserting, so exact-equality would be
/// too brittle here.
fn assert_subsequence(haystack: &[EnvelopeType], needle: &[EnvelopeType]) {
    let mut it = haystack.iter();
    for want in needle {
        let found = it.by_ref().any(|have| have == want);
        assert!(found, "expected {want:?} in order within {haystack:?}");
    }
}

#[tokio::test]
async fn happy_turn_end_to_end() {
    let mut h = harness();
    h.start().await;
    for seq in 0..9u32 {
        h.speech_frame(seq).await;
    }
    assert_eq!(h.session.state(), SessionState::Listening);

    h.commit(true).await;
    assert_eq!(h.session.state(), SessionState::Thinking);
    assert_eq!(h.calls.lock().unwrap().commit_input, vec![true]);

    h.session
        .handle_provider_event(ProviderEvent::InputCommitted { item_id: None })
        .await
        .unwrap();
    h.session
        .handle_provider_event(ProviderEvent::SttPartial { turn_id: "t1".into(), text: "I ".into() })
        .await
        .unwrap();
    h.session
        .handle_provider_event(ProviderEvent::SttFinal {
            turn_id: "t1".into(),
            text: "I need help with pricing.".into(),
        })
        .await
        .unwrap();
    h.session
        .handle_provider_event(ProviderEvent::AssistantState {
            response_id: "r1".into(),
            state: AssistantState::Requested,
        })
        .await
        .unwrap();
    h.session
        .handle_provider_event(ProviderEvent::AssistantState {
            response_id: "r1".into(),
            state: AssistantState::Speaking,
        })
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Speaking);
    h.session
        .handle_provider_event(ProviderEvent::AudioChunk {
            response_id: "r1".into(),
            seq: 0,
            bytes: vec![0x22u8; 960],
        })
        .await
        .unwrap();
    h.session
        .handle_provider_event(ProviderEvent::TextFinal {
            response_id: "r1".into(),
            text: "Here is our pricing.".into(),
        })
        .await
        .unwrap();
    h.session
        .handle_provider_event(ProviderEvent::AssistantState { response_id: "r1".into(), state: AssistantState::Done })
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Ready);

    assert_subsequence(
        &h.kinds(),
        &[
            EnvelopeType::SessionStarted,
            EnvelopeType::SessionState,
            EnvelopeType::SessionState,
            EnvelopeType::AudioCommitted,
            EnvelopeType::SessionState,
            EnvelopeType::SttPartial,
            EnvelopeType::SttFinal,
            EnvelopeType::AssistantState,
            EnvelopeType::AssistantState,
            EnvelopeType::AssistantTextFinal,
            EnvelopeType::AssistantState,
            EnvelopeType::SessionState,
        ],
    );
    assert_eq!(h.audio.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_commit_is_skipped() {
    let mut h = harness();
    h.start().await;
    for seq in 0..9u32 {
        h.silent_frame(seq).await;
    }
    h.commit(false).await;

    assert_eq!(h.session.state(), SessionState::Listening);
    assert!(h.calls.lock().unwrap().commit_input.is_empty());
    let kinds = h.kinds();
    assert!(kinds.contains(&EnvelopeType::Warning));
    assert!(!kinds.contains(&EnvelopeType::AudioCommitted));
}

#[tokio::test]
async fn barge_in_clears_output_and_interrupts_provider() {
    let mut h = harness();
    h.start().await;
    for seq in 0..9u32 {
        h.speech_frame(seq).await;
    }
    h.commit(true).await;
    h.session
        .handle_provider_event(ProviderEvent::AssistantState { response_id: "r1".into(), state: AssistantState::Speaking })
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Speaking);
    h.session
        .handle_provider_event(ProviderEvent::AudioChunk { response_id: "r1".into(), seq: 0, bytes: vec![0x33; 960] })
        .await
        .unwrap();

    h.session
        .handle_turn_event(voice_turn::TurnEvent::BargeInConfirmed)
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Interrupted);
    assert_eq!(h.calls.lock().unwrap().interrupt.len(), 1);
    assert!(h.audio.lock().unwrap().len() >= 1);
    assert!(h.kinds().contains(&EnvelopeType::AudioClear));

    h.session
        .handle_provider_event(ProviderEvent::AssistantState { response_id: "r1".into(), state: AssistantState::Interrupted })
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Ready);
}

#[tokio::test]
async fn eot_commits_only_while_listening() {
    let mut h = harness();
    h.start().await;
    for seq in 0..9u32 {
        h.speech_frame(seq).await;
    }
    assert_eq!(h.session.state(), SessionState::Listening);

    h.session
        .handle_turn_event(voice_turn::TurnEvent::Eot { reason: "vad_silence".into(), confidence: 0.8 })
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Thinking);
    assert_eq!(h.calls.lock().unwrap().commit_input.len(), 1);

    // A later eot while thinking is discarded, not re-committed.
    h.session
        .handle_turn_event(voice_turn::TurnEvent::Eot { reason: "semantic".into(), confidence: 0.6 })
        .await
        .unwrap();
    assert_eq!(h.calls.lock().unwrap().commit_input.len(), 1);
}

#[tokio::test]
async fn second_commit_while_thinking_is_blocked() {
    let mut h = harness();
    h.start().await;
    for seq in 0..9u32 {
        h.speech_frame(seq).await;
    }
    h.commit(true).await;
    assert_eq!(h.session.state(), SessionState::Thinking);

    h.commit(true).await;

    assert_eq!(h.calls.lock().unwrap().commit_input, vec![true]);
    let control = h.control.lock().unwrap();
    let warning = control
        .iter()
        .find(|e| e.kind == EnvelopeType::Warning)
        .expect("expected a warning envelope");
    assert_eq!(warning.payload["code"], "commit_blocked_state");
}

#[tokio::test]
async fn provider_socket_death_mid_speak_is_fatal() {
    let mut h = harness();
    h.start().await;
    for seq in 0..9u32 {
        h.speech_frame(seq).await;
    }
    h.commit(true).await;
    h.session
        .handle_provider_event(ProviderEvent::AssistantState { response_id: "r1".into(), state: AssistantState::Speaking })
        .await
        .unwrap();
    h.session
        .handle_provider_event(ProviderEvent::AudioChunk { response_id: "r1".into(), seq: 0, bytes: vec![0x44; 960] })
        .await
        .unwrap();
    assert_eq!(h.session.state(), SessionState::Speaking);

    h.session
        .handle_provider_event(ProviderEvent::Error {
            code: Some("upstream_error".into()),
            message: "socket closed unexpectedly".into(),
            fatal: true,
        })
        .await
        .unwrap();

    assert_eq!(h.session.state(), SessionState::Stopped);
    assert_eq!(h.calls.lock().unwrap().stop_session, 1);
    let kinds = h.kinds();
    assert!(kinds.contains(&EnvelopeType::AudioClear));
    let control = h.control.lock().unwrap();
    let error_envelope = control.iter().find(|e| e.kind == EnvelopeType::Error).unwrap();
    assert_eq!(error_envelope.payload["fatal"], true);
    assert_eq!(error_envelope.payload["code"], "upstream_error");
}
