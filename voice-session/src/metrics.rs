//! Per-turn latency checkpoints, emitted as `metrics.tick` envelopes.

use voice_protocol::Millis;

#[derive(Debug, Clone, Default)]
pub struct TurnMetrics {
    pub turn_id: String,
    pub input_started_at_ms: Option<i64>,
    pub commit_at_ms: Option<i64>,
    pub stt_partial_ms: Option<i64>,
    pub stt_final_ms: Option<i64>,
    pub first_audio_ms: Option<i64>,
}

impl TurnMetrics {
    pub fn new(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            ..Default::default()
        }
    }

    pub fn mark_input_started(&mut self) {
        if self.input_started_at_ms.is_none() {
            self.input_started_at_ms = Some(Millis::now().as_i64());
        }
    }

    pub fn mark_commit(&mut self) {
        self.commit_at_ms = Some(Millis::now().as_i64());
    }

    pub fn mark_stt_partial(&mut self) {
        if self.stt_partial_ms.is_none() {
            self.stt_partial_ms = Some(Millis::now().as_i64());
        }
    }

    pub fn mark_stt_final(&mut self) {
        self.stt_final_ms = Some(Millis::now().as_i64());
    }

    pub fn mark_first_audio(&mut self) {
        if self.first_audio_ms.is_none() {
            self.first_audio_ms = Some(Millis::now().as_i64());
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "turn_id": self.turn_id,
            "input_started_at_ms": self.input_started_at_ms,
            "commit_at_ms": self.commit_at_ms,
            "stt_partial_ms": self.stt_partial_ms,
            "stt_final_ms": self.stt_final_ms,
            "first_audio_ms": self.first_audio_ms,
        })
    }
}
