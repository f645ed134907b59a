//! `VoiceSession`: the per-call state machine and orchestrator. Owns one
//! `AudioPipeline`, one `TurnManager`, one provider, and drives a single
//! `Transport`. Every public method is meant to be called from the
//! session's own serialized operation chain (see `voice-engine`), so none
//! of it takes an internal lock.

use serde_json::json;
use tracing::{debug, info, warn};
use voice_audio::{AudioPipeline, CommitRequest};
use voice_protocol::{build_envelope, AudioCodec, AudioFrame, Envelope, EnvelopeType, FrameKind};
use voice_turn::{SemanticEotBackend, TurnEvent, TurnManager, TurnManagerConfig};

use crate::config::{merge, SessionConfig, SessionConfigOverlay};
use crate::echo::{InboundHistory, RecentBotOutputs};
use crate::error::SessionError;
use crate::metrics::TurnMetrics;
use crate::state::SessionState;
use crate::transport::{RealtimeProvider, Transport};

/// Either a turn-manager or a provider event, as drained by [`VoiceSession::next_event`].
pub enum SessionEvent {
    Turn(TurnEvent),
    Provider(voice_provider::ProviderEvent),
}

pub struct VoiceSession {
    session_id: String,
    config: SessionConfig,
    state: SessionState,
    started: bool,
    pipeline: AudioPipeline,
    turn_manager: TurnManager,
    provider: Box<dyn RealtimeProvider>,
    transport: Box<dyn Transport>,
    bot_outputs: RecentBotOutputs,
    inbound_history: InboundHistory,
    current_turn: Option<TurnMetrics>,
    has_speech_since_last_commit: bool,
    last_stt_final_chars: usize,
    assistant_played_ms: f64,
    commit_seq: u64,
    output_seq: u32,
    interrupt_in_flight: bool,
}

impl VoiceSession {
    pub fn new(
        session_id: impl Into<String>,
        runtime_config: SessionConfig,
        provider: Box<dyn RealtimeProvider>,
        transport: Box<dyn Transport>,
        semantic_backend: Option<Box<dyn SemanticEotBackend>>,
    ) -> Self {
        let turn_manager_config = TurnManagerConfig {
            vad: runtime_config.vad_config(),
            semantic_eot: runtime_config.semantic_eot_config(),
            turn_detection_mode: runtime_config.turn_detection_mode(),
        };
        Self {
            session_id: session_id.into(),
            config: runtime_config,
            state: SessionState::Ready,
            started: false,
            pipeline: AudioPipeline::new(),
            turn_manager: TurnManager::new(turn_manager_config, semantic_backend),
            provider,
            transport,
            bot_outputs: RecentBotOutputs::new(),
            inbound_history: InboundHistory::new(),
            current_turn: None,
            has_speech_since_last_commit: false,
            last_stt_final_chars: 0,
            assistant_played_ms: 0.0,
            commit_seq: 0,
            output_seq: 0,
            interrupt_in_flight: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Drains the next turn-manager event, for the caller's select loop.
    pub async fn next_turn_event(&mut self) -> Option<TurnEvent> {
        self.turn_manager.recv().await
    }

    /// Drains the next provider event, for the caller's select loop.
    pub async fn next_provider_event(&mut self) -> Option<voice_provider::ProviderEvent> {
        self.provider.recv().await
    }

    /// Drains the next turn-manager or provider event, whichever is ready
    /// first. Combines `next_turn_event`/`next_provider_event` into a single
    /// `&mut self` borrow so callers can race them in one `select!` arm.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        tokio::select! {
            Some(event) = self.turn_manager.recv() => Some(SessionEvent::Turn(event)),
            Some(event) = self.provider.recv() => Some(SessionEvent::Provider(event)),
            else => None,
        }
    }

    fn transition(&mut self, to: SessionState) {
        if !self.state.can_transition_to(to) {
            warn!(from = %self.state, to = %to, "rejected invalid session transition");
            return;
        }
        if self.state == to {
            return;
        }
        self.state = to;
    }

    async fn emit_control(&self, kind: EnvelopeType, payload: serde_json::Value) {
        let envelope = build_envelope(kind, payload, self.session_id.clone(), None);
        if let Err(e) = self.transport.send_control(&envelope).await {
            warn!(error = %e, kind = ?kind, "failed to send control envelope");
        }
    }

    async fn emit_state(&self) {
        self.emit_control(
            EnvelopeType::SessionState,
            json!({ "state": self.state.as_str() }),
        )
        .await;
    }

    async fn transition_and_emit(&mut self, to: SessionState) {
        let before = self.state;
        self.transition(to);
        if before != self.state {
            self.emit_state().await;
        }
    }

    async fn emit_warning(&self, code: &str, message: &str) {
        self.emit_control(
            EnvelopeType::Warning,
            json!({ "code": code, "message": message }),
        )
        .await;
    }

    async fn emit_error(&self, code: &str, message: &str, fatal: bool) {
        self.emit_control(
            EnvelopeType::Error,
            json!({ "code": code, "message": message, "fatal": fatal }),
        )
        .await;
    }

    async fn emit_metrics(&self) {
        if let Some(metrics) = &self.current_turn {
            self.emit_control(EnvelopeType::MetricsTick, metrics.to_json()).await;
        }
    }

    // ---- public contract ----------------------------------------------

    pub async fn start(&mut self, env: &Envelope) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::AlreadyStarted);
        }
        let overlay: SessionConfigOverlay = if env.payload.is_null() {
            SessionConfigOverlay::default()
        } else {
            serde_json::from_value(env.payload.clone()).map_err(|_| {
                SessionError::InvalidEnvelope(voice_protocol::EnvelopeError {
                    code: voice_protocol::EnvelopeErrorCode::BadShape,
                    message: "bad session.start payload".into(),
                })
            })?
        };
        self.config = merge(self.config.clone(), &overlay);

        self.provider.start_session(&self.config.provider).await?;
        self.started = true;
        self.emit_control(EnvelopeType::SessionStarted, json!({ "session_id": self.session_id }))
            .await;
        self.transition_and_emit(SessionState::Ready).await;
        Ok(())
    }

    pub async fn on_binary_audio(&mut self, bin: &[u8]) -> Result<(), SessionError> {
        let frame = AudioFrame::decode(bin)?;
        self.on_audio(frame).await
    }

    pub async fn on_audio(&mut self, frame: AudioFrame) -> Result<(), SessionError> {
        if !self.started || self.state.is_terminal() {
            return Err(SessionError::NotStarted);
        }
        if frame.kind != FrameKind::Input {
            return Err(SessionError::Pipeline(voice_audio::AudioPipelineError::MismatchedKind));
        }

        if self.current_turn.is_none() {
            let mut metrics = TurnMetrics::new(voice_protocol::new_msg_id());
            metrics.mark_input_started();
            self.current_turn = Some(metrics);
            self.emit_metrics().await;
        }

        let samples = voice_turn::samples_from_pcm16_le(&frame.bytes);
        let rms = voice_turn::rms_i16(&samples);
        if rms > 0.0 {
            self.has_speech_since_last_commit = true;
        }
        let assistant_speaking = self.state == SessionState::Speaking;
        self.turn_manager
            .on_input_frame(rms, frame.duration_ms as f64, assistant_speaking);

        self.provider.append_input_audio(&frame.bytes).await?;
        self.pipeline.append_input_frame(frame)?;

        if matches!(self.state, SessionState::Ready | SessionState::Interrupted) {
            self.transition_and_emit(SessionState::Listening).await;
        }
        Ok(())
    }

    pub async fn on_control(&mut self, env: Envelope) -> Result<(), SessionError> {
        if !self.started {
            return Err(SessionError::NotStarted);
        }
        match env.kind {
            EnvelopeType::SessionUpdate => {
                if let Ok(overlay) = serde_json::from_value::<SessionConfigOverlay>(env.payload) {
                    self.config = merge(self.config.clone(), &overlay);
                }
                Ok(())
            }
            EnvelopeType::SessionStop => {
                self.stop("client_requested").await;
                Ok(())
            }
            EnvelopeType::AudioCommit => {
                let reason = env
                    .payload
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("client_commit")
                    .to_string();
                let force_response = env
                    .payload
                    .get("force_response")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.request_commit(reason, force_response).await
            }
            EnvelopeType::AudioAppend => {
                let b64 = env.payload.get("audio").and_then(|v| v.as_str()).unwrap_or("");
                let bytes = base64_decode(b64);
                let duration_ms = AudioFrame::expected_duration_ms(
                    bytes.len(),
                    self.config.input_sample_rate_hz,
                    self.config.input_channels,
                )
                .round() as u16;
                let frame = AudioFrame {
                    kind: FrameKind::Input,
                    codec: AudioCodec::Pcm16,
                    channels: self.config.input_channels,
                    sample_rate_hz: self.config.input_sample_rate_hz,
                    seq: self.pipeline.last_input_seq().map(|s| s + 1).unwrap_or(0),
                    duration_ms,
                    bytes,
                };
                self.on_audio(frame).await
            }
            EnvelopeType::TextInput => {
                let text = env.payload.get("text").and_then(|v| v.as_str()).unwrap_or("");
                self.provider
                    .create_text_turn(voice_provider::ItemRole::User, text, true)
                    .await?;
                Ok(())
            }
            EnvelopeType::AssistantInterrupt => {
                if matches!(self.state, SessionState::Speaking | SessionState::Thinking) {
                    let played_ms = env
                        .payload
                        .get("played_ms")
                        .and_then(|v| v.as_f64())
                        .unwrap_or(self.assistant_played_ms);
                    self.handle_interrupt("client_interrupt", played_ms).await?;
                }
                Ok(())
            }
            EnvelopeType::Ping => {
                self.emit_control(EnvelopeType::Pong, json!({})).await;
                Ok(())
            }
            other => {
                let message = format!("unsupported control type: {}", other.as_wire_str());
                self.emit_error("unsupported_type", &message, false).await;
                Err(SessionError::UnsupportedType(other.as_wire_str().to_string()))
            }
        }
    }

    pub async fn stop(&mut self, reason: &str) {
        if self.state == SessionState::Stopped {
            return;
        }
        info!(reason, session_id = %self.session_id, "stopping voice session");
        if let Some(code) = fatal_stop_code(reason) {
            self.emit_error(code, "session closed on idle timeout", true).await;
        }
        self.turn_manager.reset();
        self.pipeline.reset_all();
        self.provider.stop_session().await;
        self.transition_and_emit(SessionState::Stopped).await;
    }

    // ---- commit gating & flow ------------------------------------------

    fn commit_gate_ok(&self) -> bool {
        self.has_speech_since_last_commit
            || self.pipeline.buffered_ms() >= self.config.min_user_audio_ms
            || self.last_stt_final_chars >= self.config.min_transcript_chars
    }

    async fn request_commit(&mut self, reason: String, force_response: bool) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Ready | SessionState::Listening) {
            self.emit_warning("commit_blocked_state", "a turn is already in flight").await;
            return Ok(());
        }
        if !self.commit_gate_ok() {
            let _ = self.provider.clear_input().await;
            self.pipeline.drop_pending_commits("empty_turn_skipped");
            self.emit_warning("empty_turn_skipped", "no speech detected since last commit").await;
            self.has_speech_since_last_commit = false;
            return Ok(());
        }

        self.commit_seq += 1;
        let commit_id = format!("commit-{}", self.commit_seq);
        let request = CommitRequest {
            commit_id,
            reason,
            min_ms: self.config.min_commit_ms,
            min_bytes: self.config.min_commit_bytes,
        };
        // `.map(|_| ())` drops the snapshot borrow immediately so the match
        // arms below are free to take further `&mut self` borrows.
        let commit_result = self.pipeline.consume_commit_snapshot(request).map(|_| ());
        match commit_result {
            Ok(()) => {
                self.has_speech_since_last_commit = false;
                if let Some(metrics) = &mut self.current_turn {
                    metrics.mark_commit();
                }
                self.emit_metrics().await;
                self.turn_manager.on_turn_committed();
                self.transition_and_emit(SessionState::Thinking).await;
                self.provider.commit_input(force_response).await?;
                Ok(())
            }
            Err(voice_audio::AudioPipelineError::BufferTooSmall) => {
                self.emit_warning("buffer_too_small", "buffered audio below minimum commit size").await;
                Ok(())
            }
            Err(voice_audio::AudioPipelineError::EmptyBuffer) => {
                let _ = self.provider.clear_input().await;
                self.emit_warning("empty_buffer", "no audio buffered to commit").await;
                Ok(())
            }
            Err(e) => Err(SessionError::Pipeline(e)),
        }
    }

    async fn handle_interrupt(&mut self, reason: &str, played_ms: f64) -> Result<(), SessionError> {
        if self.interrupt_in_flight {
            debug!(reason, "interrupt already in flight, ignoring duplicate signal");
            return Ok(());
        }
        self.pipeline.clear_output_frames();
        self.emit_control(EnvelopeType::AudioClear, json!({})).await;
        self.interrupt_in_flight = true;
        self.transition_and_emit(SessionState::Interrupted).await;
        self.provider.interrupt(played_ms.round() as u32).await?;
        debug!(reason, played_ms, "interrupt dispatched to provider");
        Ok(())
    }

    // ---- event handlers --------------------------------------------------

    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::Turn(event) => self.handle_turn_event(event).await,
            SessionEvent::Provider(event) => self.handle_provider_event(event).await,
        }
    }

    pub async fn handle_turn_event(&mut self, event: TurnEvent) -> Result<(), SessionError> {
        match event {
            TurnEvent::VadStart | TurnEvent::VadStop { .. } | TurnEvent::BargeInCancelled => {
                debug!(?event, "turn event (no session effect)");
                Ok(())
            }
            TurnEvent::BargeInConfirmed => {
                if matches!(self.state, SessionState::Speaking | SessionState::Thinking) {
                    self.handle_interrupt("barge_in", self.assistant_played_ms).await?;
                }
                Ok(())
            }
            TurnEvent::Eot { reason, confidence } => {
                if matches!(self.state, SessionState::Ready | SessionState::Listening) {
                    debug!(reason = %reason, confidence = confidence as f64, "end of turn, requesting commit");
                    self.request_commit(reason, true).await
                } else {
                    debug!(reason = %reason, state = %self.state, "eot discarded, not listening");
                    Ok(())
                }
            }
        }
    }

    pub async fn handle_provider_event(
        &mut self,
        event: voice_provider::ProviderEvent,
    ) -> Result<(), SessionError> {
        use voice_provider::ProviderEvent::*;
        match event {
            SessionReady => {
                debug!("provider session ready");
                Ok(())
            }
            InputCommitted { .. } => {
                if let Some(snapshot) = self.pipeline.ack_pending_commit() {
                    self.emit_control(
                        EnvelopeType::AudioCommitted,
                        json!({ "commit_id": snapshot.commit_id, "reason": snapshot.reason }),
                    )
                    .await;
                }
                Ok(())
            }
            SttPartial { turn_id, text } => {
                if let Some(metrics) = &mut self.current_turn {
                    metrics.mark_stt_partial();
                }
                self.emit_control(
                    EnvelopeType::SttPartial,
                    json!({ "turn_id": turn_id, "text": text }),
                )
                .await;
                Ok(())
            }
            SttFinal { turn_id, text } => {
                if let Some(metrics) = &mut self.current_turn {
                    metrics.mark_stt_final();
                }
                self.last_stt_final_chars = text.trim().chars().count();
                self.inbound_history.push(&text);
                self.emit_control(
                    EnvelopeType::SttFinal,
                    json!({ "turn_id": turn_id, "text": text.clone() }),
                )
                .await;
                if self.turn_manager.local_turn_detection_active() && !self.bot_outputs.is_likely_bot_echo(&text)
                {
                    self.turn_manager.on_stt_final(&text).await;
                }
                Ok(())
            }
            AssistantState { response_id, state } => {
                self.handle_assistant_state(response_id, state).await
            }
            TextDelta { response_id, delta } => {
                self.emit_control(
                    EnvelopeType::AssistantTextDelta,
                    json!({ "response_id": response_id, "delta": delta }),
                )
                .await;
                Ok(())
            }
            TextFinal { response_id, text } => {
                self.bot_outputs.push(&text);
                self.emit_control(
                    EnvelopeType::AssistantTextFinal,
                    json!({ "response_id": response_id, "text": text }),
                )
                .await;
                Ok(())
            }
            AudioChunk { response_id: _, seq: _, bytes } => {
                if let Some(metrics) = &mut self.current_turn {
                    metrics.mark_first_audio();
                }
                let duration_ms = AudioFrame::expected_duration_ms(
                    bytes.len(),
                    self.config.input_sample_rate_hz,
                    self.config.input_channels,
                );
                self.assistant_played_ms += duration_ms;
                let frame = AudioFrame {
                    kind: FrameKind::Output,
                    codec: AudioCodec::Pcm16,
                    channels: self.config.input_channels,
                    sample_rate_hz: self.config.input_sample_rate_hz,
                    seq: self.output_seq,
                    duration_ms: duration_ms.round() as u16,
                    bytes,
                };
                self.output_seq += 1;
                self.pipeline.append_output_frame(frame.clone())?;
                self.transport.send_audio(&frame).await?;
                Ok(())
            }
            Warning { code, message } => {
                self.emit_warning(&code, &message).await;
                Ok(())
            }
            Error { code, message, fatal } => {
                if fatal {
                    self.pipeline.clear_output_frames();
                    self.emit_control(EnvelopeType::AudioClear, json!({})).await;
                    self.transition_and_emit(SessionState::Error).await;
                }
                self.emit_error(code.as_deref().unwrap_or("upstream_error"), &message, fatal)
                    .await;
                if fatal {
                    self.stop("fatal_provider_error").await;
                }
                Ok(())
            }
        }
    }

    async fn handle_assistant_state(
        &mut self,
        response_id: String,
        state: voice_provider::AssistantState,
    ) -> Result<(), SessionError> {
        use voice_provider::AssistantState as PState;
        let wire = match state {
            PState::Requested => "requested",
            PState::Speaking => "speaking",
            PState::Interrupted => "interrupted",
            PState::Done => "done",
        };
        self.emit_control(
            EnvelopeType::AssistantState,
            json!({ "response_id": response_id, "state": wire }),
        )
        .await;

        match state {
            PState::Requested => {}
            PState::Speaking => {
                self.transition_and_emit(SessionState::Speaking).await;
            }
            PState::Interrupted | PState::Done => {
                self.interrupt_in_flight = false;
                self.assistant_played_ms = 0.0;
                self.current_turn = None;
                self.transition_and_emit(SessionState::Ready).await;
            }
        }
        Ok(())
    }
}

fn base64_decode(s: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s).unwrap_or_default()
}

/// Maps a `stop()` reason to a wire error code when the stop is an abnormal
/// close the client should be told about, rather than one it requested or
/// one already reported via `emit_error` at the point of failure.
fn fatal_stop_code(reason: &str) -> Option<&'static str> {
    match reason {
        "idle_timeout" => Some("idle_timeout"),
        _ => None,
    }
}
