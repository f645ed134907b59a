//! `EngineConfig`: process-wide defaults merged from, in increasing
//! precedence, struct defaults, an optional YAML file, then `VOICE_CORE_*`
//! environment variables. Per-session overrides still apply on top of this
//! at `session.start` via `voice_session::SessionConfigOverlay`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use voice_session::SessionConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigFile {
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
    pub semantic_eot_timeout_ms: Option<u64>,
    pub post_turn_silence_ms: Option<f64>,
    pub output_chunk_ms: Option<u32>,
    pub provider_connect_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub session_defaults: SessionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_defaults: SessionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads (2) a YAML file if `path` is given and exists, then (3)
    /// `VOICE_CORE_*` environment variables, each layer overriding the last
    /// with "last non-`None` wins".
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = EngineConfig::default();

        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
            let file: EngineConfigFile = serde_yaml::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
            config.apply_file(&file);
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_file(&mut self, file: &EngineConfigFile) {
        let d = &mut self.session_defaults;
        if let Some(v) = file.min_commit_ms {
            d.min_commit_bytes = voice_audio::default_min_commit_bytes(d.input_sample_rate_hz, d.input_channels, v);
            d.min_commit_ms = v;
        }
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = file.$field {
                    d.$field = v;
                }
            };
        }
        set!(min_user_audio_ms);
        set!(min_transcript_chars);
        set!(vad_threshold);
        set!(vad_silence_ms);
        set!(vad_hangover_ms);
        set!(min_speech_ms_for_turn);
        set!(barge_in_min_ms);
        set!(semantic_eot_enabled);
        set!(semantic_eot_use_llm);
        set!(semantic_eot_min_delay_ms);
        set!(semantic_eot_max_delay_ms);
        set!(semantic_eot_timeout_ms);
        set!(post_turn_silence_ms);
        set!(output_chunk_ms);
        set!(provider_connect_timeout_ms);
        set!(idle_timeout_ms);
    }

    fn apply_env(&mut self) {
        let d = &mut self.session_defaults;
        if let Some(v) = env_f64("VOICE_CORE_MIN_COMMIT_MS") {
            d.min_commit_bytes = voice_audio::default_min_commit_bytes(d.input_sample_rate_hz, d.input_channels, v);
            d.min_commit_ms = v;
        }
        if let Some(v) = env_f64("VOICE_CORE_MIN_USER_AUDIO_MS") {
            d.min_user_audio_ms = v;
        }
        if let Some(v) = env_usize("VOICE_CORE_MIN_TRANSCRIPT_CHARS") {
            d.min_transcript_chars = v;
        }
        if let Some(v) = env_f64("VOICE_CORE_VAD_THRESHOLD") {
            d.vad_threshold = v as f32;
        }
        if let Some(v) = env_f64("VOICE_CORE_VAD_SILENCE_MS") {
            d.vad_silence_ms = v;
        }
        if let Some(v) = env_f64("VOICE_CORE_VAD_HANGOVER_MS") {
            d.vad_hangover_ms = v;
        }
        if let Some(v) = env_f64("VOICE_CORE_MIN_SPEECH_MS_FOR_TURN") {
            d.min_speech_ms_for_turn = v;
        }
        if let Some(v) = env_f64("VOICE_CORE_BARGE_IN_MIN_MS") {
            d.barge_in_min_ms = v;
        }
        if let Some(v) = env_bool("VOICE_CORE_SEMANTIC_EOT_ENABLED") {
            d.semantic_eot_enabled = v;
        }
        if let Some(v) = env_bool("VOICE_CORE_SEMANTIC_EOT_USE_LLM") {
            d.semantic_eot_use_llm = v;
        }
        if let Some(v) = env_f64("VOICE_CORE_SEMANTIC_EOT_MIN_DELAY_MS") {
            d.semantic_eot_min_delay_ms = v;
        }
        if let Some(v) = env_f64("VOICE_CORE_SEMANTIC_EOT_MAX_DELAY_MS") {
            d.semantic_eot_max_delay_ms = v;
        }
        if let Some(v) = env_u64("VOICE_CORE_SEMANTIC_EOT_TIMEOUT_MS") {
            d.semantic_eot_timeout_ms = v;
        }
        if let Some(v) = env_f64("VOICE_CORE_POST_TURN_SILENCE_MS") {
            d.post_turn_silence_ms = v;
        }
        if let Some(v) = env_u64("VOICE_CORE_OUTPUT_CHUNK_MS") {
            d.output_chunk_ms = v as u32;
        }
        if let Some(v) = env_u64("VOICE_CORE_PROVIDER_CONNECT_TIMEOUT_MS") {
            d.provider_connect_timeout_ms = v;
        }
        if let Some(v) = env_u64("VOICE_CORE_IDLE_TIMEOUT_MS") {
            d.idle_timeout_ms = v;
        }
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_session_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.session_defaults.min_commit_ms, SessionConfig::default().min_commit_ms);
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let mut config = EngineConfig::default();
        let file = EngineConfigFile {
            vad_threshold: Some(0.03),
            ..Default::default()
        };
        config.apply_file(&file);
        assert_eq!(config.session_defaults.vad_threshold, 0.03);
    }

    #[test]
    fn min_commit_ms_override_recomputes_bytes() {
        let mut config = EngineConfig::default();
        let file = EngineConfigFile {
            min_commit_ms: Some(240.0),
            ..Default::default()
        };
        config.apply_file(&file);
        assert_eq!(config.session_defaults.min_commit_ms, 240.0);
        assert_eq!(config.session_defaults.min_commit_bytes, 11520);
    }
}
