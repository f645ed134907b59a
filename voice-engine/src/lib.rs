//! `VoiceEngine`: process-wide façade bundling the loaded `EngineConfig` and
//! the `SessionManager` registry. Library crates in this workspace never
//! initialize a `tracing` subscriber themselves; that stays the binary's job.

mod config;
mod registry;
pub mod simulate;

pub use config::{EngineConfig, EngineConfigFile};
pub use registry::{SessionHandle, SessionManager};

use std::time::Duration;

use voice_protocol::Envelope;
use voice_provider::AIProvider;
use voice_session::VoiceSession;

/// Bundles the engine's loaded configuration with its live session registry.
pub struct VoiceEngine {
    pub config: EngineConfig,
    pub sessions: SessionManager,
}

impl VoiceEngine {
    pub fn new(config: EngineConfig) -> Self {
        let idle_timeout = Duration::from_millis(config.session_defaults.idle_timeout_ms);
        Self {
            config,
            sessions: SessionManager::new(idle_timeout),
        }
    }

    /// Starts a new session against a live provider connection and a caller-
    /// supplied transport, registers it, and replays `start_env` through it.
    pub async fn start_session(
        &self,
        session_id: impl Into<String>,
        start_env: Envelope,
        provider: AIProvider,
        transport: Box<dyn voice_session::Transport>,
    ) -> Result<SessionHandle, voice_session::SessionError> {
        let session_id = session_id.into();
        let session = VoiceSession::new(
            session_id.clone(),
            self.config.session_defaults.clone(),
            Box::new(provider),
            transport,
            None,
        );
        let handle = self.sessions.register(session_id, session).await;
        handle.start(start_env).await?;
        Ok(handle)
    }
}
