//! Per-session configuration: a fully-resolved `SessionConfig` plus the
//! partial overlay carried in a `session.start` payload, merged with
//! "last non-`None` wins" over the engine's runtime defaults.

use serde::{Deserialize, Serialize};
use voice_provider::SessionConfig as ProviderSessionConfig;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub min_commit_ms: f64,
    pub min_commit_bytes: usize,
    pub min_user_audio_ms: f64,
    pub min_transcript_chars: usize,
    pub vad_threshold: f32,
    pub vad_silence_ms: f64,
    pub vad_hangover_ms: f64,
    pub min_speech_ms_for_turn: f64,
    pub barge_in_min_ms: f64,
    pub semantic_eot_enabled: bool,
    pub semantic_eot_use_llm: bool,
    pub semantic_eot_min_delay_ms: f64,
    pub semantic_eot_max_delay_ms: f64,
    pub semantic_eot_timeout_ms: u64,
    pub post_turn_silence_ms: f64,
    pub output_chunk_ms: u32,
    pub provider_connect_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub input_sample_rate_hz: u32,
    pub input_channels: u8,
    pub provider: ProviderSessionConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let min_commit_ms = voice_audio::DEFAULT_MIN_COMMIT_MS;
        Self {
            min_commit_ms,
            min_commit_bytes: voice_audio::default_min_commit_bytes(24_000, 1, min_commit_ms),
            min_user_audio_ms: 400.0,
            min_transcript_chars: 3,
            vad_threshold: 0.015,
            vad_silence_ms: 280.0,
            vad_hangover_ms: 180.0,
            min_speech_ms_for_turn: 180.0,
            barge_in_min_ms: 220.0,
            semantic_eot_enabled: true,
            semantic_eot_use_llm: false,
            semantic_eot_min_delay_ms: 250.0,
            semantic_eot_max_delay_ms: 900.0,
            semantic_eot_timeout_ms: 180,
            post_turn_silence_ms: 360.0,
            output_chunk_ms: 90,
            provider_connect_timeout_ms: 8000,
            idle_timeout_ms: 30_000,
            input_sample_rate_hz: 24_000,
            input_channels: 1,
            provider: ProviderSessionConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn vad_config(&self) -> voice_turn::VadConfig {
        voice_turn::VadConfig {
            vad_threshold: self.vad_threshold,
            vad_silence_ms: self.vad_silence_ms,
            vad_hangover_ms: self.vad_hangover_ms,
            min_speech_ms_for_turn: self.min_speech_ms_for_turn,
            barge_in_min_ms: self.barge_in_min_ms,
        }
    }

    pub fn semantic_eot_config(&self) -> voice_turn::SemanticEotConfig {
        voice_turn::SemanticEotConfig {
            enabled: self.semantic_eot_enabled,
            use_llm: self.semantic_eot_use_llm,
            min_delay_ms: self.semantic_eot_min_delay_ms,
            max_delay_ms: self.semantic_eot_max_delay_ms,
            timeout_ms: self.semantic_eot_timeout_ms,
        }
    }

    pub fn turn_detection_mode(&self) -> voice_turn::TurnDetectionMode {
        self.provider.turn_detection_mode()
    }
}

/// All-`Option` overlay carried in a `session.start` payload; merged over
/// the engine's resolved defaults with "last non-`None` wins".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfigOverlay {
    pub min_commit_ms: Option<f64>,
    pub min_user_audio_ms: Option<f64>,
    pub min_transcript_chars: Option<usize>,
    pub vad_threshold: Option<f32>,
    pub vad_silence_ms: Option<f64>,
    pub vad_hangover_ms: Option<f64>,
    pub min_speech_ms_for_turn: Option<f64>,
    pub barge_in_min_ms: Option<f64>,
    pub semantic_eot_enabled: Option<bool>,
    pub semantic_eot_use_llm: Option<bool>,
    pub semantic_eot_min_delay_ms: Option<f64>,
    pub semantic_eot_max_delay_ms: Option<f64>,
    pub post_turn_silence_ms: Option<f64>,
    pub output_chunk_ms: Option<u32>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub temperature: Option<f32>,
}

/// Merges `overlay` onto `base`, "last non-`None` wins"; recomputes
/// `min_commit_bytes` if `min_commit_ms` changed.
pub fn merge(base: SessionConfig, overlay: &SessionConfigOverlay) -> SessionConfig {
    let mut merged = base;
    if let Some(v) = overlay.min_commit_ms {
        merged.min_commit_bytes = voice_audio::default_min_commit_bytes(
            merged.input_sample_rate_hz,
            merged.input_channels,
            v,
        );
        merged.min_commit_ms = v;
    }
    if let Some(v) = overlay.min_user_audio_ms {
        merged.min_user_audio_ms = v;
    }
    if let Some(v) = overlay.min_transcript_chars {
        merged.min_transcript_chars = v;
    }
    if let Some(v) = overlay.vad_threshold {
        merged.vad_threshold = v;
    }
    if let Some(v) = overlay.vad_silence_ms {
        merged.vad_silence_ms = v;
    }
    if let Some(v) = overlay.vad_hangover_ms {
        merged.vad_hangover_ms = v;
    }
    if let Some(v) = overlay.min_speech_ms_for_turn {
        merged.min_speech_ms_for_turn = v;
    }
    if let Some(v) = overlay.barge_in_min_ms {
        merged.barge_in_min_ms = v;
    }
    if let Some(v) = overlay.semantic_eot_enabled {
        merged.semantic_eot_enabled = v;
    }
    if let Some(v) = overlay.semantic_eot_use_llm {
        merged.semantic_eot_use_llm = v;
    }
    if let Some(v) = overlay.semantic_eot_min_delay_ms {
        merged.semantic_eot_min_delay_ms = v;
    }
    if let Some(v) = overlay.semantic_eot_max_delay_ms {
        merged.semantic_eot_max_delay_ms = v;
    }
    if let Some(v) = overlay.post_turn_silence_ms {
        merged.post_turn_silence_ms = v;
    }
    if let Some(v) = overlay.output_chunk_ms {
        merged.output_chunk_ms = v;
    }
    if let Some(v) = &overlay.voice {
        merged.provider.voice = Some(v.clone());
    }
    if let Some(v) = &overlay.instructions {
        merged.provider.instructions = Some(v.clone());
    }
    if let Some(v) = overlay.temperature {
        merged.provider.temperature = Some(v);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_min_commit_bytes_matches_formula() {
        let config = SessionConfig::default();
        assert_eq!(config.min_commit_bytes, 5760);
    }

    #[test]
    fn overlay_with_all_none_leaves_base_untouched() {
        let base = SessionConfig::default();
        let before = base.vad_threshold;
        let merged = merge(base, &SessionConfigOverlay::default());
        assert_eq!(merged.vad_threshold, before);
    }

    #[test]
    fn overlay_changing_min_commit_ms_recomputes_bytes() {
        let base = SessionConfig::default();
        let overlay = SessionConfigOverlay {
            min_commit_ms: Some(240.0),
            ..Default::default()
        };
        let merged = merge(base, &overlay);
        assert_eq!(merged.min_commit_ms, 240.0);
        assert_eq!(merged.min_commit_bytes, 11520);
    }

    #[test]
    fn overlay_sets_provider_voice() {
        let base = SessionConfig::default();
        let overlay = SessionConfigOverlay {
            voice: Some("verse".into()),
            ..Default::default()
        };
        let merged = merge(base, &overlay);
        assert_eq!(merged.provider.voice.as_deref(), Some("verse"));
    }
}
