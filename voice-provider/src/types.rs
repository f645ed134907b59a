//! Request/response payload shapes for the provider's session surface.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        threshold: f32,
        silence_duration_ms: u32,
        prefix_padding_ms: u32,
        create_response: bool,
        interrupt_response: bool,
    },
    SemanticVad {
        eagerness: Eagerness,
        create_response: bool,
        interrupt_response: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Eagerness {
    Low,
    Medium,
    High,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// The `session.update` payload. `turn_detection` absent means manual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub input_audio_format: String,
    pub output_audio_format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            modalities: vec!["audio".into(), "text".into()],
            instructions: None,
            voice: None,
            temperature: None,
            input_audio_format: "pcm16".into(),
            output_audio_format: "pcm16".into(),
            input_audio_transcription: Some(InputAudioTranscription {
                model: "whisper-1".into(),
                language: None,
            }),
            turn_detection: None,
        }
    }
}

impl SessionConfig {
    pub fn turn_detection_mode(&self) -> voice_turn::TurnDetectionMode {
        match self.turn_detection {
            None => voice_turn::TurnDetectionMode::Manual,
            Some(TurnDetection::ServerVad { .. }) => voice_turn::TurnDetectionMode::ServerVad,
            Some(TurnDetection::SemanticVad { .. }) => voice_turn::TurnDetectionMode::SemanticVad,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseCreateOptions {
    pub instructions: Option<String>,
}

/// A role-tagged conversation item used for injected text turns and
/// system-context notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemRole {
    User,
    System,
    Assistant,
}

impl ItemRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemRole::User => "user",
            ItemRole::System => "system",
            ItemRole::Assistant => "assistant",
        }
    }
}

/// Normalized events the adapter hands to the session, decoupled from the
/// provider's wire shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    SessionReady,
    InputCommitted { item_id: Option<String> },
    SttPartial { turn_id: String, text: String },
    SttFinal { turn_id: String, text: String },
    AssistantState { response_id: String, state: AssistantState },
    TextDelta { response_id: String, delta: String },
    TextFinal { response_id: String, text: String },
    AudioChunk { response_id: String, seq: u32, bytes: Vec<u8> },
    Warning { code: String, message: String },
    Error { code: Option<String>, message: String, fatal: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantState {
    Requested,
    Speaking,
    Interrupted,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_without_turn_detection_is_manual() {
        let config = SessionConfig::default();
        assert_eq!(config.turn_detection_mode(), voice_turn::TurnDetectionMode::Manual);
    }

    #[test]
    fn session_config_serializes_without_null_turn_detection() {
        let config = SessionConfig::default();
        let value = serde_json::to_value(&config).unwrap();
        assert!(value.get("turn_detection").is_none());
    }

    #[test]
    fn server_vad_round_trips() {
        let turn_detection = TurnDetection::ServerVad {
            threshold: 0.5,
            silence_duration_ms: 300,
            prefix_padding_ms: 200,
            create_response: true,
            interrupt_response: true,
        };
        let value = serde_json::to_value(&turn_detection).unwrap();
        assert_eq!(value["type"], "server_vad");
        let back: TurnDetection = serde_json::from_value(value).unwrap();
        assert_eq!(back, turn_detection);
    }
}
