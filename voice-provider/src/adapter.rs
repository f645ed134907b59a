//! `AIProvider`: owns one provider websocket session, translates its event
//! stream into normalized `ProviderEvent`s, and exposes the outgoing command
//! surface the voice session drives.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::{Client, WebSocketSession};
use crate::error::{ApiError, Error, Result};
use crate::events::{client as wire_out, server as wire_in};
use crate::types::{AssistantState, ItemRole, ProviderEvent, ResponseCreateOptions, SessionConfig};

const INTERRUPT_WATCHDOG: Duration = Duration::from_millis(1400);
const DEFAULT_OUTPUT_CHUNK_MS: u32 = 90;

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub output_chunk_ms: u32,
    pub output_sample_rate_hz: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            output_chunk_ms: DEFAULT_OUTPUT_CHUNK_MS,
            output_sample_rate_hz: 24_000,
        }
    }
}

struct ResponseGate {
    in_progress: bool,
    interrupt_until: Option<tokio::time::Instant>,
    pending: Option<ResponseCreateOptions>,
}

impl ResponseGate {
    fn new() -> Self {
        Self {
            in_progress: false,
            interrupt_until: None,
            pending: None,
        }
    }

    fn blocked(&self) -> bool {
        self.in_progress
            || self
                .interrupt_until
                .map(|deadline| tokio::time::Instant::now() < deadline)
                .unwrap_or(false)
    }
}

/// Accumulates base64-decoded PCM16 deltas and re-chunks them into
/// fixed-duration frames, carrying a stray odd byte across chunk boundaries.
struct OutputChunker {
    buffer: VecDeque<u8>,
    carry: Option<u8>,
    chunk_bytes: usize,
    seq: u32,
}

impl OutputChunker {
    fn new(config: &AdapterConfig) -> Self {
        let bytes_per_ms = config.output_sample_rate_hz as f64 * 2.0 / 1000.0;
        let chunk_bytes = (bytes_per_ms * config.output_chunk_ms as f64).round() as usize;
        Self {
            buffer: VecDeque::new(),
            carry: None,
            chunk_bytes: chunk_bytes.max(2),
            seq: 0,
        }
    }

    fn push(&mut self, mut bytes: Vec<u8>) -> Vec<Vec<u8>> {
        if let Some(carry) = self.carry.take() {
            bytes.insert(0, carry);
        }
        if bytes.len() % 2 != 0 {
            self.carry = bytes.pop();
        }
        self.buffer.extend(bytes);
        self.drain_full_chunks()
    }

    fn drain_full_chunks(&mut self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while self.buffer.len() >= self.chunk_bytes {
            let chunk: Vec<u8> = self.buffer.drain(..self.chunk_bytes).collect();
            chunks.push(chunk);
        }
        chunks
    }

    /// Flushes whatever remains (including a trailing carry byte) as one
    /// final short chunk, used on `response.audio.done` / `response.done`.
    fn flush(&mut self) -> Option<Vec<u8>> {
        if let Some(carry) = self.carry.take() {
            self.buffer.push_back(carry);
        }
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.drain(..).collect())
        }
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}

struct SttAccumulator {
    buffers: HashMap<String, String>,
}

impl SttAccumulator {
    fn new() -> Self {
        Self { buffers: HashMap::new() }
    }

    fn on_delta(&mut self, item_id: &str, delta: &str) -> String {
        let entry = self.buffers.entry(item_id.to_string()).or_default();
        entry.push_str(delta);
        entry.clone()
    }

    fn take_final(&mut self, item_id: &str) -> String {
        self.buffers.remove(item_id).unwrap_or_default()
    }
}

/// The realtime adapter itself. One instance per voice session.
pub struct AIProvider {
    client: Client,
    session: Option<WebSocketSession>,
    config: AdapterConfig,
    gate: ResponseGate,
    chunker: OutputChunker,
    stt: SttAccumulator,
    current_response_id: Option<String>,
    interrupt_cancel: Option<CancellationToken>,
    events_tx: mpsc::UnboundedSender<ProviderEvent>,
    events_rx: mpsc::UnboundedReceiver<ProviderEvent>,
}

impl AIProvider {
    pub fn new(client: Client, config: AdapterConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            client,
            session: None,
            chunker: OutputChunker::new(&config),
            config,
            gate: ResponseGate::new(),
            stt: SttAccumulator::new(),
            current_response_id: None,
            interrupt_cancel: None,
            events_tx,
            events_rx,
        }
    }

    /// Returns the next normalized event, pumping the raw provider socket as
    /// needed. A raw `session.recv()` of `None` means the socket closed
    /// (or errored) mid-session; that surfaces as a fatal `ProviderEvent::Error`
    /// rather than silently going quiet.
    pub async fn recv(&mut self) -> Option<ProviderEvent> {
        loop {
            let Some(mut session) = self.session.take() else {
                return self.events_rx.recv().await;
            };
            tokio::select! {
                event = self.events_rx.recv() => {
                    self.session = Some(session);
                    return event;
                }
                raw = session.recv() => {
                    match raw {
                        Some(raw) => {
                            self.session = Some(session);
                            self.handle_raw_event(raw.kind, raw.value);
                        }
                        None => {
                            let _ = self.events_tx.send(ProviderEvent::Error {
                                code: Some("upstream_error".to_string()),
                                message: "provider connection closed".to_string(),
                                fatal: true,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Opens the socket, sends `session.update`, and waits for the
    /// acknowledging `session.updated` before returning.
    pub async fn start_session(&mut self, session_config: &SessionConfig) -> Result<()> {
        let mut session = self.client.connect().await?;
        session.send_raw(&json!({
            "type": wire_out::SESSION_UPDATE,
            "session": session_config,
        }))?;

        loop {
            let event = tokio::time::timeout(Duration::from_secs(8), session.recv())
                .await
                .map_err(|_| Error::Timeout("session.updated".into()))?
                .ok_or(Error::SessionClosed)?;
            if event.kind == wire_in::SESSION_UPDATED {
                break;
            } else if event.kind == wire_in::ERROR {
                return Err(Error::Api(ApiError::from_event(&event.value)));
            }
            // session.created and anything else just keep waiting.
        }
        self.session = Some(session);
        let _ = self.events_tx.send(ProviderEvent::SessionReady);
        Ok(())
    }

    fn handle_raw_event(&mut self, kind: String, value: Value) {
        match kind.as_str() {
            k if k == wire_in::INPUT_COMMITTED => {
                let item_id = value
                    .get("item_id")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let _ = self.events_tx.send(ProviderEvent::InputCommitted { item_id });
            }
            k if k == wire_in::TRANSCRIPTION_DELTA => {
                if let (Some(item_id), Some(delta)) = (
                    value.get("item_id").and_then(|v| v.as_str()),
                    value.get("delta").and_then(|v| v.as_str()),
                ) {
                    let text = self.stt.on_delta(item_id, delta);
                    let _ = self.events_tx.send(ProviderEvent::SttPartial {
                        turn_id: item_id.to_string(),
                        text,
                    });
                }
            }
            k if k == wire_in::TRANSCRIPTION_COMPLETED => {
                if let Some(item_id) = value.get("item_id").and_then(|v| v.as_str()) {
                    self.stt.take_final(item_id);
                    let text = value
                        .get("transcript")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let _ = self.events_tx.send(ProviderEvent::SttFinal {
                        turn_id: item_id.to_string(),
                        text,
                    });
                }
            }
            k if k == wire_in::RESPONSE_CREATED => {
                self.gate.in_progress = true;
                let response_id = value
                    .get("response")
                    .and_then(|r| r.get("id"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.current_response_id = Some(response_id.clone());
                let _ = self.events_tx.send(ProviderEvent::AssistantState {
                    response_id,
                    state: AssistantState::Requested,
                });
            }
            k if k == wire_in::TEXT_DELTA || k == wire_in::AUDIO_TRANSCRIPT_DELTA => {
                if let (Some(response_id), Some(delta)) = (
                    self.current_response_id.clone(),
                    value.get("delta").and_then(|v| v.as_str()),
                ) {
                    let _ = self.events_tx.send(ProviderEvent::AssistantState {
                        response_id: response_id.clone(),
                        state: AssistantState::Speaking,
                    });
                    let _ = self.events_tx.send(ProviderEvent::TextDelta {
                        response_id,
                        delta: delta.to_string(),
                    });
                }
            }
            k if k == wire_in::TEXT_DONE || k == wire_in::AUDIO_TRANSCRIPT_DONE => {
                if let Some(response_id) = self.current_response_id.clone() {
                    let text = value
                        .get("text")
                        .or_else(|| value.get("transcript"))
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let _ = self.events_tx.send(ProviderEvent::TextFinal { response_id, text });
                }
            }
            k if k == wire_in::AUDIO_DELTA => {
                if let Some(response_id) = self.current_response_id.clone() {
                    if let Some(b64) = value.get("delta").and_then(|v| v.as_str()) {
                        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(b64) {
                            for chunk in self.chunker.push(bytes) {
                                let _ = self.events_tx.send(ProviderEvent::AudioChunk {
                                    response_id: response_id.clone(),
                                    seq: self.chunker.next_seq(),
                                    bytes: chunk,
                                });
                            }
                        }
                    }
                }
            }
            k if k == wire_in::AUDIO_DONE => {
                self.flush_chunker();
            }
            k if k == wire_in::RESPONSE_DONE => {
                self.flush_chunker();
                self.gate.in_progress = false;
                let status = value
                    .get("response")
                    .and_then(|r| r.get("status"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("completed");
                if let Some(response_id) = self.current_response_id.take() {
                    let state = match status {
                        "cancelled" | "interrupted" | "incomplete" => AssistantState::Interrupted,
                        _ => AssistantState::Done,
                    };
                    let _ = self.events_tx.send(ProviderEvent::AssistantState { response_id, state });
                }
                self.dispatch_pending_response_create();
            }
            k if k == wire_in::ERROR => {
                let api_error = ApiError::from_event(&value);
                if api_error.is_recoverable() {
                    let _ = self.events_tx.send(ProviderEvent::Warning {
                        code: api_error.code.clone().unwrap_or_default(),
                        message: api_error.message.clone(),
                    });
                    if api_error.code.as_deref() == Some("conversation_already_has_active_response")
                    {
                        self.gate.in_progress = true;
                    }
                } else {
                    let _ = self.events_tx.send(ProviderEvent::Error {
                        code: api_error.code.clone(),
                        message: api_error.message.clone(),
                        fatal: false,
                    });
                }
            }
            other => {
                debug!(kind = other, "unhandled provider event");
            }
        }
    }

    fn flush_chunker(&mut self) {
        if let Some(response_id) = self.current_response_id.clone() {
            if let Some(bytes) = self.chunker.flush() {
                let _ = self.events_tx.send(ProviderEvent::AudioChunk {
                    response_id,
                    seq: self.chunker.next_seq(),
                    bytes,
                });
            }
        }
    }

    fn session_mut(&mut self) -> Result<&mut WebSocketSession> {
        self.session.as_mut().ok_or(Error::SessionClosed)
    }

    pub fn append_input_audio(&mut self, pcm16: &[u8]) -> Result<()> {
        let b64 = base64::engine::general_purpose::STANDARD.encode(pcm16);
        self.session_mut()?.send_raw(&json!({
            "type": wire_out::INPUT_AUDIO_APPEND,
            "audio": b64,
        }))
    }

    pub fn commit_input(&mut self, force_response: bool) -> Result<()> {
        self.session_mut()?
            .send_raw(&json!({ "type": wire_out::INPUT_AUDIO_COMMIT }))?;
        if force_response {
            self.request_response(ResponseCreateOptions::default())?;
        }
        Ok(())
    }

    pub fn clear_input(&mut self) -> Result<()> {
        self.session_mut()?
            .send_raw(&json!({ "type": wire_out::INPUT_AUDIO_CLEAR }))
    }

    /// Truncates the in-flight assistant item at the played offset, cancels
    /// the response, then starts the interrupt watchdog window.
    pub fn interrupt(&mut self, truncate_audio_ms: u32) -> Result<()> {
        if let Some(response_id) = self.current_response_id.clone() {
            self.session_mut()?.send_raw(&json!({
                "type": wire_out::ITEM_TRUNCATE,
                "item_id": response_id,
                "content_index": 0,
                "audio_end_ms": truncate_audio_ms,
            }))?;
        }
        self.session_mut()?
            .send_raw(&json!({ "type": wire_out::RESPONSE_CANCEL }))?;
        if let Some(cancel) = self.interrupt_cancel.take() {
            cancel.cancel();
        }
        let cancel = CancellationToken::new();
        self.interrupt_cancel = Some(cancel.clone());
        self.gate.interrupt_until = Some(tokio::time::Instant::now() + INTERRUPT_WATCHDOG);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(INTERRUPT_WATCHDOG) => {
                    debug!("interrupt watchdog elapsed without response.done");
                    let _ = tx; // watchdog is advisory; gate clears itself via deadline check
                }
                _ = cancel.cancelled() => {}
            }
        });
        Ok(())
    }

    pub fn create_text_turn(&mut self, role: ItemRole, text: &str, create_response: bool) -> Result<()> {
        self.session_mut()?.send_raw(&json!({
            "type": wire_out::ITEM_CREATE,
            "item": {
                "type": "message",
                "role": role.as_str(),
                "content": [{ "type": "input_text", "text": text }],
            },
        }))?;
        if create_response {
            self.request_response(ResponseCreateOptions::default())?;
        }
        Ok(())
    }

    pub fn append_system_context(&mut self, text: &str) -> Result<()> {
        self.create_text_turn(ItemRole::System, text, false)
    }

    /// Requests a response, respecting the gate: if blocked, coalesces into
    /// the single pending slot and dispatches it once `response.done` clears
    /// the gate.
    pub fn request_response(&mut self, options: ResponseCreateOptions) -> Result<()> {
        if self.gate.blocked() {
            self.gate.pending = Some(options);
            return Ok(());
        }
        self.dispatch_response_create(options)
    }

    fn dispatch_pending_response_create(&mut self) {
        if self.gate.blocked() {
            return;
        }
        if let Some(options) = self.gate.pending.take() {
            if let Err(e) = self.dispatch_response_create(options) {
                warn!(error = %e, "failed to dispatch queued response.create");
            }
        }
    }

    fn dispatch_response_create(&mut self, options: ResponseCreateOptions) -> Result<()> {
        let mut response = json!({});
        if let Some(instructions) = options.instructions {
            response["instructions"] = json!(instructions);
        }
        self.gate.in_progress = true;
        self.session_mut()?.send_raw(&json!({
            "type": wire_out::RESPONSE_CREATE,
            "response": response,
        }))
    }

    pub async fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(cancel) = self.interrupt_cancel.take() {
            cancel.cancel();
        }
        self.gate = ResponseGate::new();
        self.current_response_id = None;
    }
}

pub fn new_event_id() -> String {
    format!("evt_{}", Uuid::new_v4().simple())
}
