//! The boundary traits `VoiceSession` drives against: a control/audio
//! transport out to the client, and the realtime provider in.

use async_trait::async_trait;
use voice_protocol::{AudioFrame, Envelope};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Outbound side of the client connection: control envelopes and binary
/// audio frames flowing toward the browser/WebSocket client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_control(&self, envelope: &Envelope) -> Result<(), TransportError>;
    async fn send_audio(&self, frame: &AudioFrame) -> Result<(), TransportError>;
}

/// Normalized events from the realtime provider, decoupled so `voice-session`
/// does not need to depend on `voice-provider`'s concrete `AIProvider` type
/// in its test surface.
#[async_trait]
pub trait RealtimeProvider: Send + Sync {
    async fn start_session(
        &mut self,
        config: &voice_provider::SessionConfig,
    ) -> Result<(), voice_provider::Error>;
    async fn append_input_audio(&mut self, pcm16: &[u8]) -> Result<(), voice_provider::Error>;
    async fn commit_input(&mut self, force_response: bool) -> Result<(), voice_provider::Error>;
    async fn clear_input(&mut self) -> Result<(), voice_provider::Error>;
    async fn interrupt(&mut self, truncate_audio_ms: u32) -> Result<(), voice_provider::Error>;
    async fn create_text_turn(
        &mut self,
        role: voice_provider::ItemRole,
        text: &str,
        create_response: bool,
    ) -> Result<(), voice_provider::Error>;
    async fn append_system_context(&mut self, text: &str) -> Result<(), voice_provider::Error>;
    async fn stop_session(&mut self);
    async fn recv(&mut self) -> Option<voice_provider::ProviderEvent>;
}

#[async_trait]
impl RealtimeProvider for voice_provider::AIProvider {
    async fn start_session(
        &mut self,
        config: &voice_provider::SessionConfig,
    ) -> Result<(), voice_provider::Error> {
        voice_provider::AIProvider::start_session(self, config).await
    }

    async fn append_input_audio(&mut self, pcm16: &[u8]) -> Result<(), voice_provider::Error> {
        voice_provider::AIProvider::append_input_audio(self, pcm16)
    }

    async fn commit_input(&mut self, force_response: bool) -> Result<(), voice_provider::Error> {
        voice_provider::AIProvider::commit_input(self, force_response)
    }

    async fn clear_input(&mut self) -> Result<(), voice_provider::Error> {
        voice_provider::AIProvider::clear_input(self)
    }

    async fn interrupt(&mut self, truncate_audio_ms: u32) -> Result<(), voice_provider::Error> {
        voice_provider::AIProvider::interrupt(self, truncate_audio_ms)
    }

    async fn create_text_turn(
        &mut self,
        role: voice_provider::ItemRole,
        text: &str,
        create_response: bool,
    ) -> Result<(), voice_provider::Error> {
        voice_provider::AIProvider::create_text_turn(self, role, text, create_response)
    }

    async fn append_system_context(&mut self, text: &str) -> Result<(), voice_provider::Error> {
        voice_provider::AIProvider::append_system_context(self, text)
    }

    async fn stop_session(&mut self) {
        voice_provider::AIProvider::stop_session(self).await
    }

    async fn recv(&mut self) -> Option<voice_provider::ProviderEvent> {
        voice_provider::AIProvider::recv(self).await
    }
}
