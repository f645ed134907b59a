//! Provider and transport test doubles backing the `simulate` CLI
//! subcommand: no real upstream credential or socket involved, just a
//! scripted response so the session machinery can be smoke-tested locally.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use voice_protocol::{AudioFrame, Envelope};
use voice_provider::{AssistantState, ItemRole, ProviderEvent};
use voice_session::{RealtimeProvider, Transport, TransportError};

/// A provider double that replies to every commit (or text turn) with a
/// short scripted assistant response instead of talking to a real upstream.
pub struct SimulatedProvider {
    events_tx: mpsc::UnboundedSender<ProviderEvent>,
    events_rx: mpsc::UnboundedReceiver<ProviderEvent>,
    response_seq: u32,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self { events_tx, events_rx, response_seq: 0 }
    }

    fn script_response(&mut self, turn_text: &str) {
        self.response_seq += 1;
        let response_id = format!("sim-response-{}", self.response_seq);
        let turn_id = format!("sim-turn-{}", self.response_seq);
        let tx = self.events_tx.clone();
        let reply_text = format!("(simulated reply to: {turn_text})");
        let turn_text = turn_text.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            let _ = tx.send(ProviderEvent::InputCommitted { item_id: None });
            let _ = tx.send(ProviderEvent::SttFinal { turn_id: turn_id.clone(), text: turn_text });
            let _ = tx.send(ProviderEvent::AssistantState { response_id: response_id.clone(), state: AssistantState::Requested });
            let _ = tx.send(ProviderEvent::AssistantState { response_id: response_id.clone(), state: AssistantState::Speaking });
            let _ = tx.send(ProviderEvent::AudioChunk { response_id: response_id.clone(), seq: 0, bytes: vec![0u8; 1920] });
            let _ = tx.send(ProviderEvent::TextFinal { response_id: response_id.clone(), text: reply_text });
            let _ = tx.send(ProviderEvent::AssistantState { response_id, state: AssistantState::Done });
        });
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeProvider for SimulatedProvider {
    async fn start_session(&mut self, _config: &voice_provider::SessionConfig) -> Result<(), voice_provider::Error> {
        let _ = self.events_tx.send(ProviderEvent::SessionReady);
        Ok(())
    }

    async fn append_input_audio(&mut self, _pcm16: &[u8]) -> Result<(), voice_provider::Error> {
        Ok(())
    }

    async fn commit_input(&mut self, _force_response: bool) -> Result<(), voice_provider::Error> {
        self.script_response("synthetic speech buffer");
        Ok(())
    }

    async fn clear_input(&mut self) -> Result<(), voice_provider::Error> {
        Ok(())
    }

    async fn interrupt(&mut self, _truncate_audio_ms: u32) -> Result<(), voice_provider::Error> {
        Ok(())
    }

    async fn create_text_turn(
        &mut self,
        _role: ItemRole,
        text: &str,
        create_response: bool,
    ) -> Result<(), voice_provider::Error> {
        if create_response {
            self.script_response(text);
        }
        Ok(())
    }

    async fn append_system_context(&mut self, _text: &str) -> Result<(), voice_provider::Error> {
        Ok(())
    }

    async fn stop_session(&mut self) {
        debug!("simulated provider stopped");
    }

    async fn recv(&mut self) -> Option<ProviderEvent> {
        self.events_rx.recv().await
    }
}

/// A transport double that prints every outgoing control envelope as a JSON
/// line to stdout; output audio frames are summarized, not dumped raw.
pub struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send_control(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let line = serde_json::to_string(envelope).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        println!("{line}");
        Ok(())
    }

    async fn send_audio(&self, frame: &AudioFrame) -> Result<(), TransportError> {
        println!(
            "{}",
            serde_json::json!({
                "type": "audio.frame",
                "seq": frame.seq,
                "duration_ms": frame.duration_ms,
                "bytes": frame.bytes.len(),
            })
        );
        Ok(())
    }
}
