//! Orchestrates VAD, barge-in, and semantic end-of-turn into a single
//! outward event stream the session drains, instead of nested callbacks.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::semantic_eot::{SemanticEot, SemanticEotBackend, SemanticEotConfig};
use crate::vad::{Vad, VadConfig, VadEvent};

/// How the provider's own turn detection is configured for this session.
/// Per the engine's safe default, local VAD/EoT is disabled whenever the
/// provider runs anything other than manual turn detection, and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDetectionMode {
    Manual,
    ServerVad,
    SemanticVad,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    VadStart,
    VadStop { speech_duration_ms: f64 },
    BargeInConfirmed,
    BargeInCancelled,
    Eot { reason: String, confidence: f32 },
}

#[derive(Debug, Clone)]
pub struct TurnManagerConfig {
    pub vad: VadConfig,
    pub semantic_eot: SemanticEotConfig,
    pub turn_detection_mode: TurnDetectionMode,
}

pub struct TurnManager {
    config: TurnManagerConfig,
    vad: Vad,
    semantic: SemanticEot,
    events_tx: mpsc::UnboundedSender<TurnEvent>,
    events_rx: mpsc::UnboundedReceiver<TurnEvent>,
    eot_cancel: Option<CancellationToken>,
    is_first_user_turn: bool,
}

impl TurnManager {
    pub fn new(config: TurnManagerConfig, backend: Option<Box<dyn SemanticEotBackend>>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            vad: Vad::new(config.vad),
            semantic: SemanticEot::new(config.semantic_eot, backend),
            config,
            events_tx,
            events_rx,
            eot_cancel: None,
            is_first_user_turn: true,
        }
    }

    /// Whether local VAD/barge-in/EoT is authoritative for this session.
    pub fn local_turn_detection_active(&self) -> bool {
        self.config.turn_detection_mode == TurnDetectionMode::Manual
    }

    /// Receives the next turn event; the session's operation chain drains this.
    pub async fn recv(&mut self) -> Option<TurnEvent> {
        self.events_rx.recv().await
    }

    /// Feeds one input frame's RMS through the VAD. No-op when local turn
    /// detection is disabled in favor of the provider's own VAD.
    pub fn on_input_frame(&mut self, rms: f32, duration_ms: f64, assistant_speaking: bool) {
        if !self.local_turn_detection_active() {
            return;
        }
        let min_speech_ms = self.vad.min_speech_ms_for_turn();
        let hangover_ms = self.config.vad.vad_hangover_ms;
        for event in self.vad.on_frame(rms, duration_ms, assistant_speaking) {
            match event {
                VadEvent::Start => {
                    let _ = self.events_tx.send(TurnEvent::VadStart);
                }
                VadEvent::Stop { speech_duration_ms } => {
                    let _ = self.events_tx.send(TurnEvent::VadStop { speech_duration_ms });
                    if speech_duration_ms >= min_speech_ms && !assistant_speaking {
                        self.schedule_eot("vad_silence".into(), 0.8, hangover_ms);
                    }
                }
                VadEvent::BargeInConfirmed => {
                    let _ = self.events_tx.send(TurnEvent::BargeInConfirmed);
                }
                VadEvent::BargeInCancelled => {
                    let _ = self.events_tx.send(TurnEvent::BargeInCancelled);
                }
            }
        }
    }

    /// Feeds a stable STT final transcript through the semantic classifier and
    /// (re)arms the EoT timer at the recommended delay. No-op when local turn
    /// detection is disabled.
    pub async fn on_stt_final(&mut self, text: &str) {
        if !self.local_turn_detection_active() || !self.config.semantic_eot.enabled {
            return;
        }
        let verdict = self.semantic.classify(text, self.is_first_user_turn).await;
        debug!(status = ?verdict.status, delay_ms = verdict.recommended_delay_ms, "semantic eot verdict");
        // Always (re)arm: an `incomplete`/`uncertain` verdict still gets a
        // timer so a later revised transcript can re-arm it at a new delay.
        self.schedule_eot(verdict.reason, verdict.confidence, verdict.recommended_delay_ms);
    }

    fn schedule_eot(&mut self, reason: String, confidence: f32, delay_ms: f64) {
        if let Some(cancel) = self.eot_cancel.take() {
            cancel.cancel();
        }
        let cancel = CancellationToken::new();
        self.eot_cancel = Some(cancel.clone());
        let tx = self.events_tx.clone();
        let delay = std::time::Duration::from_millis(delay_ms.max(0.0) as u64);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(TurnEvent::Eot { reason, confidence });
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// Called once a commit has been produced for the current turn; clears
    /// per-turn timers and advances first-turn bookkeeping.
    pub fn on_turn_committed(&mut self) {
        if let Some(cancel) = self.eot_cancel.take() {
            cancel.cancel();
        }
        self.is_first_user_turn = false;
    }

    /// Cancels any pending EoT timer without marking the turn committed.
    pub fn cancel_eot(&mut self) {
        if let Some(cancel) = self.eot_cancel.take() {
            cancel.cancel();
        }
    }

    pub fn reset(&mut self) {
        self.cancel_eot();
        self.vad = Vad::new(self.config.vad);
        self.is_first_user_turn = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_eot::EotVerdict;
    use async_trait::async_trait;

    fn manual_config() -> TurnManagerConfig {
        TurnManagerConfig {
            vad: VadConfig::default(),
            semantic_eot: SemanticEotConfig {
                enabled: true,
                use_llm: false,
                ..SemanticEotConfig::default()
            },
            turn_detection_mode: TurnDetectionMode::Manual,
        }
    }

    #[tokio::test]
    async fn disabled_when_provider_turn_detection_active() {
        let config = TurnManagerConfig {
            turn_detection_mode: TurnDetectionMode::ServerVad,
            ..manual_config()
        };
        let mut mgr = TurnManager::new(config, None);
        mgr.on_input_frame(0.5, 20.0, false);
        // No VadStart should have been emitted since local detection is off.
        let result = tokio::time::timeout(std::time::Duration::from_millis(20), mgr.recv()).await;
        assert!(result.is_err(), "expected no events from disabled turn manager");
    }

    #[tokio::test]
    async fn vad_start_emitted_when_manual() {
        let mut mgr = TurnManager::new(manual_config(), None);
        mgr.on_input_frame(0.5, 20.0, false);
        let event = mgr.recv().await.unwrap();
        assert_eq!(event, TurnEvent::VadStart);
    }

    #[tokio::test]
    async fn eot_fires_after_delay_and_can_be_re_armed_longer() {
        let mut mgr = TurnManager::new(manual_config(), None);
        mgr.schedule_eot("first".into(), 0.5, 10.0);
        mgr.schedule_eot("second".into(), 0.5, 30.0);
        let event = tokio::time::timeout(std::time::Duration::from_millis(200), mgr.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            TurnEvent::Eot { reason, .. } => assert_eq!(reason, "second"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    struct NeverCalledBackend;

    #[async_trait]
    impl SemanticEotBackend for NeverCalledBackend {
        async fn classify(&self, _transcript: &str) -> Result<EotVerdict, crate::semantic_eot::SemanticEotError> {
            panic!("backend should not be called when heuristic is decisive");
        }
    }

    #[tokio::test]
    async fn on_stt_final_schedules_eot_from_heuristic() {
        let mut mgr = TurnManager::new(manual_config(), Some(Box::new(NeverCalledBackend)));
        mgr.on_stt_final("I need help with pricing and").await;
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), mgr.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(event, TurnEvent::Eot { .. }));
    }
}
