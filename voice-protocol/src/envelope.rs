//! Control envelope: the JSON message exchanged between client and engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::time::Millis;

pub const PROTOCOL_VERSION: u32 = 1;

/// Every envelope type recognized on either direction of the wire.
///
/// Modeled as a closed enum (rather than a bare string) so that `on_control`
/// dispatch in the session layer is an exhaustive match, not a string switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeType {
    // client -> server
    SessionStart,
    SessionUpdate,
    SessionStop,
    AudioCommit,
    AudioAppend,
    TextInput,
    AssistantInterrupt,
    Ping,
    // server -> client
    Welcome,
    SessionStarted,
    SessionState,
    AudioCommitted,
    AudioClear,
    SttPartial,
    SttFinal,
    AssistantState,
    AssistantTextDelta,
    AssistantTextFinal,
    TurnEot,
    MetricsTick,
    Warning,
    Error,
    Pong,
}

impl EnvelopeType {
    pub fn as_wire_str(self) -> &'static str {
        match self {
            EnvelopeType::SessionStart => "session.start",
            EnvelopeType::SessionUpdate => "session.update",
            EnvelopeType::SessionStop => "session.stop",
            EnvelopeType::AudioCommit => "audio.commit",
            EnvelopeType::AudioAppend => "audio.append",
            EnvelopeType::TextInput => "text.input",
            EnvelopeType::AssistantInterrupt => "assistant.interrupt",
            EnvelopeType::Ping => "ping",
            EnvelopeType::Welcome => "welcome",
            EnvelopeType::SessionStarted => "session.started",
            EnvelopeType::SessionState => "session.state",
            EnvelopeType::AudioCommitted => "audio.committed",
            EnvelopeType::AudioClear => "audio.clear",
            EnvelopeType::SttPartial => "stt.partial",
            EnvelopeType::SttFinal => "stt.final",
            EnvelopeType::AssistantState => "assistant.state",
            EnvelopeType::AssistantTextDelta => "assistant.text.delta",
            EnvelopeType::AssistantTextFinal => "assistant.text.final",
            EnvelopeType::TurnEot => "turn.eot",
            EnvelopeType::MetricsTick => "metrics.tick",
            EnvelopeType::Warning => "warning",
            EnvelopeType::Error => "error",
            EnvelopeType::Pong => "pong",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Self> {
        Some(match s {
            "session.start" => EnvelopeType::SessionStart,
            "session.update" => EnvelopeType::SessionUpdate,
            "session.stop" => EnvelopeType::SessionStop,
            "audio.commit" => EnvelopeType::AudioCommit,
            "audio.append" => EnvelopeType::AudioAppend,
            "text.input" => EnvelopeType::TextInput,
            "assistant.interrupt" => EnvelopeType::AssistantInterrupt,
            "ping" => EnvelopeType::Ping,
            "welcome" => EnvelopeType::Welcome,
            "session.started" => EnvelopeType::SessionStarted,
            "session.state" => EnvelopeType::SessionState,
            "audio.committed" => EnvelopeType::AudioCommitted,
            "audio.clear" => EnvelopeType::AudioClear,
            "stt.partial" => EnvelopeType::SttPartial,
            "stt.final" => EnvelopeType::SttFinal,
            "assistant.state" => EnvelopeType::AssistantState,
            "assistant.text.delta" => EnvelopeType::AssistantTextDelta,
            "assistant.text.final" => EnvelopeType::AssistantTextFinal,
            "turn.eot" => EnvelopeType::TurnEot,
            "metrics.tick" => EnvelopeType::MetricsTick,
            "warning" => EnvelopeType::Warning,
            "error" => EnvelopeType::Error,
            "pong" => EnvelopeType::Pong,
            _ => return None,
        })
    }
}

impl Serialize for EnvelopeType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_wire_str())
    }
}

impl<'de> Deserialize<'de> for EnvelopeType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EnvelopeType::from_wire_str(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown envelope type: {s}")))
    }
}

/// A control envelope as defined in the wire protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u32,
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub session_id: String,
    pub msg_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub ts_ms: i64,
    #[serde(default = "Value::default")]
    pub payload: Value,
}

/// Validation failure codes, mirroring the wire error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeErrorCode {
    #[error("bad_json")]
    BadJson,
    #[error("bad_shape")]
    BadShape,
    #[error("bad_type")]
    BadType,
    #[error("bad_version")]
    BadVersion,
    #[error("missing_session_id")]
    MissingSessionId,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct EnvelopeError {
    pub code: EnvelopeErrorCode,
    pub message: String,
}

impl EnvelopeError {
    fn new(code: EnvelopeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Options governing envelope validation.
#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// When set, the envelope's `session_id` must equal this value.
    pub expected_session_id: Option<String>,
}

/// Builds a frozen, well-formed envelope with all mandatory fields populated.
pub fn build_envelope(
    kind: EnvelopeType,
    payload: Value,
    session_id: impl Into<String>,
    reply_to: Option<String>,
) -> Envelope {
    Envelope {
        v: PROTOCOL_VERSION,
        kind,
        session_id: session_id.into(),
        msg_id: new_msg_id(),
        reply_to,
        ts_ms: Millis::now().as_i64(),
        payload,
    }
}

/// Generates a fresh, unique message id.
pub fn new_msg_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parses and validates a raw JSON string into an `Envelope`.
pub fn validate_envelope(raw: &str, options: &ValidateOptions) -> Result<Envelope, EnvelopeError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| EnvelopeError::new(EnvelopeErrorCode::BadJson, e.to_string()))?;
    validate_envelope_value(value, options)
}

/// Validates an already-parsed JSON value into an `Envelope`.
pub fn validate_envelope_value(
    value: Value,
    options: &ValidateOptions,
) -> Result<Envelope, EnvelopeError> {
    let obj = value.as_object().ok_or_else(|| {
        EnvelopeError::new(EnvelopeErrorCode::BadShape, "envelope must be a JSON object")
    })?;

    let v = obj
        .get("v")
        .and_then(Value::as_u64)
        .ok_or_else(|| EnvelopeError::new(EnvelopeErrorCode::BadShape, "missing field: v"))?;
    if v as u32 != PROTOCOL_VERSION {
        return Err(EnvelopeError::new(
            EnvelopeErrorCode::BadVersion,
            format!("unsupported protocol version: {v}"),
        ));
    }

    let type_str = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| EnvelopeError::new(EnvelopeErrorCode::BadShape, "missing field: type"))?;
    let kind = EnvelopeType::from_wire_str(type_str)
        .ok_or_else(|| EnvelopeError::new(EnvelopeErrorCode::BadType, type_str.to_string()))?;

    let session_id = obj
        .get("session_id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            EnvelopeError::new(EnvelopeErrorCode::MissingSessionId, "missing session_id")
        })?
        .to_string();

    if let Some(expected) = &options.expected_session_id {
        if expected != &session_id {
            return Err(EnvelopeError::new(
                EnvelopeErrorCode::MissingSessionId,
                "session_id does not match active session",
            ));
        }
    }

    let msg_id = obj
        .get("msg_id")
        .and_then(Value::as_str)
        .ok_or_else(|| EnvelopeError::new(EnvelopeErrorCode::BadShape, "missing field: msg_id"))?
        .to_string();

    let reply_to = obj
        .get("reply_to")
        .and_then(Value::as_str)
        .map(str::to_string);

    let ts_ms = obj
        .get("ts_ms")
        .and_then(Value::as_i64)
        .ok_or_else(|| EnvelopeError::new(EnvelopeErrorCode::BadShape, "missing field: ts_ms"))?;

    let payload = obj.get("payload").cloned().unwrap_or(Value::Null);

    Ok(Envelope {
        v: v as u32,
        kind,
        session_id,
        msg_id,
        reply_to,
        ts_ms,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn build_then_validate_round_trips() {
        let env = build_envelope(
            EnvelopeType::SessionStarted,
            json!({"ready": true}),
            "sess-1",
            Some("msg-0".into()),
        );
        let raw = serde_json::to_string(&env).unwrap();
        let parsed = validate_envelope(&raw, &ValidateOptions::default()).unwrap();
        assert_eq!(parsed.kind, EnvelopeType::SessionStarted);
        assert_eq!(parsed.session_id, "sess-1");
        assert_eq!(parsed.reply_to.as_deref(), Some("msg-0"));
    }

    #[test]
    fn rejects_bad_json() {
        let err = validate_envelope("{not json", &ValidateOptions::default()).unwrap_err();
        assert_eq!(err.code, EnvelopeErrorCode::BadJson);
    }

    #[test]
    fn rejects_unknown_type() {
        let raw = json!({
            "v": 1, "type": "totally.unknown", "session_id": "s", "msg_id": "m", "ts_ms": 1
        })
        .to_string();
        let err = validate_envelope(&raw, &ValidateOptions::default()).unwrap_err();
        assert_eq!(err.code, EnvelopeErrorCode::BadType);
    }

    #[test]
    fn rejects_missing_session_id() {
        let raw = json!({"v": 1, "type": "ping", "msg_id": "m", "ts_ms": 1}).to_string();
        let err = validate_envelope(&raw, &ValidateOptions::default()).unwrap_err();
        assert_eq!(err.code, EnvelopeErrorCode::MissingSessionId);
    }

    #[test]
    fn rejects_bad_version() {
        let raw = json!({
            "v": 2, "type": "ping", "session_id": "s", "msg_id": "m", "ts_ms": 1
        })
        .to_string();
        let err = validate_envelope(&raw, &ValidateOptions::default()).unwrap_err();
        assert_eq!(err.code, EnvelopeErrorCode::BadVersion);
    }

    #[test]
    fn msg_ids_are_unique() {
        assert_ne!(new_msg_id(), new_msg_id());
    }
}
