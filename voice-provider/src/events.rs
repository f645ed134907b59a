//! Parsing of the provider's server-sent event stream into wire-shape
//! values; normalization into `ProviderEvent` lives in `adapter`.

use serde_json::Value;

pub mod server {
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_UPDATED: &str = "session.updated";
    pub const SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
    pub const SPEECH_STOPPED: &str = "input_audio_buffer.speech_stopped";
    pub const INPUT_COMMITTED: &str = "input_audio_buffer.committed";
    pub const TRANSCRIPTION_DELTA: &str = "conversation.item.input_audio_transcription.delta";
    pub const TRANSCRIPTION_COMPLETED: &str =
        "conversation.item.input_audio_transcription.completed";
    pub const RESPONSE_CREATED: &str = "response.created";
    pub const OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
    pub const CONTENT_PART_ADDED: &str = "response.content_part.added";
    pub const TEXT_DELTA: &str = "response.text.delta";
    pub const TEXT_DONE: &str = "response.text.done";
    pub const AUDIO_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
    pub const AUDIO_TRANSCRIPT_DONE: &str = "response.audio_transcript.done";
    pub const AUDIO_DELTA: &str = "response.audio.delta";
    pub const AUDIO_DONE: &str = "response.audio.done";
    pub const RESPONSE_DONE: &str = "response.done";
    pub const ERROR: &str = "error";
}

pub mod client {
    pub const SESSION_UPDATE: &str = "session.update";
    pub const INPUT_AUDIO_APPEND: &str = "input_audio_buffer.append";
    pub const INPUT_AUDIO_COMMIT: &str = "input_audio_buffer.commit";
    pub const INPUT_AUDIO_CLEAR: &str = "input_audio_buffer.clear";
    pub const ITEM_CREATE: &str = "conversation.item.create";
    pub const ITEM_TRUNCATE: &str = "conversation.item.truncate";
    pub const RESPONSE_CREATE: &str = "response.create";
    pub const RESPONSE_CANCEL: &str = "response.cancel";
}

/// A raw, minimally-typed server event: a type tag plus the full JSON body
/// so the adapter can reach into event-specific fields.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: String,
    pub value: Value,
}

pub fn parse_event(raw: &str) -> Result<RawEvent, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    Ok(RawEvent { kind, value })
}

pub fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(|v| v.as_str())
}

pub fn u32_field(value: &Value, field: &str) -> Option<u32> {
    value.get(field).and_then(|v| v.as_u64()).map(|n| n as u32)
}
