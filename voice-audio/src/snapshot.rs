//! The snapshot produced when the engine closes a user turn.

use voice_protocol::AudioFrame;

#[derive(Debug, Clone, PartialEq)]
pub struct CommitSnapshot {
    pub commit_id: String,
    pub reason: String,
    pub from_seq: u32,
    pub to_seq: u32,
    pub frames: Vec<AudioFrame>,
    pub buffered_ms: f64,
    pub buffered_bytes: usize,
    pub created_at_ms: i64,
}

/// Parameters controlling whether a commit is accepted.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub commit_id: String,
    pub reason: String,
    pub min_ms: f64,
    pub min_bytes: usize,
}

/// Default minimum buffered duration before a commit is accepted, in milliseconds.
pub const DEFAULT_MIN_COMMIT_MS: f64 = 120.0;

/// Computes the default minimum buffered bytes for a given format, matching
/// `sample_rate * channels * 2 * min_commit_ms / 1000`.
pub fn default_min_commit_bytes(sample_rate_hz: u32, channels: u8, min_commit_ms: f64) -> usize {
    ((sample_rate_hz as f64) * (channels as f64) * 2.0 * min_commit_ms / 1000.0).round() as usize
}
