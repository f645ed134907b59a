//! The ordered input/output audio pipeline owned by a single session.
//!
//! Concurrency is handled upstream by the session's single-writer operation
//! chain (see `voice-engine`'s `SessionManager`), so this struct carries no
//! internal locking of its own. It is meant to be owned exclusively by one
//! task at a time, unlike a ring buffer shared across threads.

use std::collections::VecDeque;

use tracing::warn;
use voice_protocol::{AudioFrame, FrameKind};

use crate::error::AudioPipelineError;
use crate::snapshot::{CommitRequest, CommitSnapshot};

/// If buffered input exceeds this many milliseconds, the oldest frames are
/// dropped until the buffer is halved, and the caller is told how many bytes
/// were shed so it can surface a `buffer_overflow` warning.
pub const BACKPRESSURE_MAX_BUFFERED_MS: f64 = 30_000.0;

#[derive(Debug, Default)]
pub struct AudioPipeline {
    input_frames: VecDeque<AudioFrame>,
    buffered_ms: f64,
    buffered_bytes: usize,
    pending_commits: VecDeque<CommitSnapshot>,
    output_frames: VecDeque<AudioFrame>,
    last_input_seq: Option<u32>,
    last_output_seq: Option<u32>,
}

impl AudioPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffered_ms(&self) -> f64 {
        self.buffered_ms
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Appends an ordered input frame, updating buffered counters.
    pub fn append_input_frame(&mut self, frame: AudioFrame) -> Result<(), AudioPipelineError> {
        if frame.kind != FrameKind::Input {
            return Err(AudioPipelineError::MismatchedKind);
        }
        self.buffered_ms += frame.duration_ms as f64;
        self.buffered_bytes += frame.bytes.len();
        self.last_input_seq = Some(frame.seq);
        self.input_frames.push_back(frame);
        self.enforce_backpressure();
        Ok(())
    }

    /// Drops the oldest buffered frames until `buffered_ms` is at most half of
    /// `BACKPRESSURE_MAX_BUFFERED_MS`. Returns the number of bytes shed.
    fn enforce_backpressure(&mut self) -> usize {
        if self.buffered_ms <= BACKPRESSURE_MAX_BUFFERED_MS {
            return 0;
        }
        let target = BACKPRESSURE_MAX_BUFFERED_MS / 2.0;
        let mut shed_bytes = 0usize;
        while self.buffered_ms > target {
            let Some(dropped) = self.input_frames.pop_front() else {
                break;
            };
            self.buffered_ms -= dropped.duration_ms as f64;
            self.buffered_bytes -= dropped.bytes.len();
            shed_bytes += dropped.bytes.len();
        }
        warn!(shed_bytes, "audio pipeline backpressure: dropped oldest input frames");
        shed_bytes
    }

    /// Moves all currently buffered input frames into a `CommitSnapshot` if
    /// the buffer meets the requested minimums, resetting buffered counters.
    pub fn consume_commit_snapshot(
        &mut self,
        request: CommitRequest,
    ) -> Result<&CommitSnapshot, AudioPipelineError> {
        if self.buffered_ms <= 0.0 && self.buffered_bytes == 0 {
            return Err(AudioPipelineError::EmptyBuffer);
        }
        if self.buffered_ms < request.min_ms || self.buffered_bytes < request.min_bytes {
            return Err(AudioPipelineError::BufferTooSmall);
        }

        let frames: Vec<AudioFrame> = self.input_frames.drain(..).collect();
        let from_seq = frames.first().map(|f| f.seq).unwrap_or(0);
        let to_seq = frames.last().map(|f| f.seq).unwrap_or(0);
        let snapshot = CommitSnapshot {
            commit_id: request.commit_id,
            reason: request.reason,
            from_seq,
            to_seq,
            frames,
            buffered_ms: self.buffered_ms,
            buffered_bytes: self.buffered_bytes,
            created_at_ms: voice_protocol::Millis::now().as_i64(),
        };
        self.buffered_ms = 0.0;
        self.buffered_bytes = 0;
        self.pending_commits.push_back(snapshot);
        self.pending_commits.back().ok_or(AudioPipelineError::EmptyBuffer)
    }

    /// Pops the oldest pending commit snapshot, used on upstream `input.committed`.
    pub fn ack_pending_commit(&mut self) -> Option<CommitSnapshot> {
        self.pending_commits.pop_front()
    }

    /// Discards all pending snapshots, used when the session backs out of a commit.
    pub fn drop_pending_commits(&mut self, reason: &str) -> usize {
        let count = self.pending_commits.len();
        if count > 0 {
            warn!(reason, count, "dropping pending commit snapshots");
        }
        self.pending_commits.clear();
        count
    }

    pub fn append_output_frame(&mut self, frame: AudioFrame) -> Result<(), AudioPipelineError> {
        if frame.kind != FrameKind::Output {
            return Err(AudioPipelineError::MismatchedKind);
        }
        self.last_output_seq = Some(frame.seq);
        self.output_frames.push_back(frame);
        Ok(())
    }

    pub fn pop_output_frame(&mut self) -> Option<AudioFrame> {
        self.output_frames.pop_front()
    }

    /// Clears the output queue, returning the number of frames cleared.
    pub fn clear_output_frames(&mut self) -> usize {
        let count = self.output_frames.len();
        self.output_frames.clear();
        count
    }

    pub fn last_input_seq(&self) -> Option<u32> {
        self.last_input_seq
    }

    pub fn last_output_seq(&self) -> Option<u32> {
        self.last_output_seq
    }

    /// Resets every piece of local state, used on `stop`.
    pub fn reset_all(&mut self) {
        self.input_frames.clear();
        self.buffered_ms = 0.0;
        self.buffered_bytes = 0;
        self.pending_commits.clear();
        self.output_frames.clear();
        self.last_input_seq = None;
        self.last_output_seq = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_protocol::AudioCodec;

    fn input_frame(seq: u32, duration_ms: u16, bytes: usize) -> AudioFrame {
        AudioFrame {
            kind: FrameKind::Input,
            codec: AudioCodec::Pcm16,
            channels: 1,
            sample_rate_hz: 24_000,
            seq,
            duration_ms,
            bytes: vec![1u8; bytes],
        }
    }

    fn commit_req(min_ms: f64, min_bytes: usize) -> CommitRequest {
        CommitRequest {
            commit_id: "c1".into(),
            reason: "test".into(),
            min_ms,
            min_bytes,
        }
    }

    #[test]
    fn append_tracks_buffered_counters() {
        let mut p = AudioPipeline::new();
        p.append_input_frame(input_frame(1, 20, 960)).unwrap();
        p.append_input_frame(input_frame(2, 20, 960)).unwrap();
        assert_eq!(p.buffered_ms(), 40.0);
        assert_eq!(p.buffered_bytes(), 1920);
    }

    #[test]
    fn rejects_mismatched_kind() {
        let mut p = AudioPipeline::new();
        let mut out = input_frame(1, 20, 960);
        out.kind = FrameKind::Output;
        assert_eq!(
            p.append_input_frame(out),
            Err(AudioPipelineError::MismatchedKind)
        );
    }

    #[test]
    fn commit_rejected_when_below_minimum() {
        let mut p = AudioPipeline::new();
        p.append_input_frame(input_frame(1, 119, 100)).unwrap();
        assert_eq!(
            p.consume_commit_snapshot(commit_req(120.0, 2880)),
            Err(AudioPipelineError::BufferTooSmall)
        );
    }

    #[test]
    fn commit_accepted_at_exact_minimum() {
        let mut p = AudioPipeline::new();
        p.append_input_frame(input_frame(1, 120, 2880)).unwrap();
        let snap = p.consume_commit_snapshot(commit_req(120.0, 2880)).unwrap();
        assert_eq!(snap.buffered_ms, 120.0);
        assert_eq!(p.buffered_ms(), 0.0);
        assert_eq!(p.buffered_bytes(), 0);
    }

    #[test]
    fn commit_on_empty_buffer_is_rejected() {
        let mut p = AudioPipeline::new();
        assert_eq!(
            p.consume_commit_snapshot(commit_req(120.0, 2880)),
            Err(AudioPipelineError::EmptyBuffer)
        );
    }

    #[test]
    fn ack_pops_oldest_pending_commit_fifo() {
        let mut p = AudioPipeline::new();
        p.append_input_frame(input_frame(1, 200, 4800)).unwrap();
        p.consume_commit_snapshot(commit_req(120.0, 2880)).unwrap();
        p.append_input_frame(input_frame(2, 200, 4800)).unwrap();
        p.consume_commit_snapshot(commit_req(120.0, 2880)).unwrap();

        let first = p.ack_pending_commit().unwrap();
        assert_eq!(first.from_seq, 1);
        let second = p.ack_pending_commit().unwrap();
        assert_eq!(second.from_seq, 2);
        assert!(p.ack_pending_commit().is_none());
    }

    #[test]
    fn drop_pending_commits_discards_all() {
        let mut p = AudioPipeline::new();
        p.append_input_frame(input_frame(1, 200, 4800)).unwrap();
        p.consume_commit_snapshot(commit_req(120.0, 2880)).unwrap();
        assert_eq!(p.drop_pending_commits("state changed"), 1);
        assert!(p.ack_pending_commit().is_none());
    }

    #[test]
    fn output_queue_fifo_and_clear() {
        let mut p = AudioPipeline::new();
        let mut f1 = input_frame(1, 20, 960);
        f1.kind = FrameKind::Output;
        let mut f2 = input_frame(2, 20, 960);
        f2.kind = FrameKind::Output;
        p.append_output_frame(f1).unwrap();
        p.append_output_frame(f2).unwrap();
        assert_eq!(p.clear_output_frames(), 2);
        assert!(p.pop_output_frame().is_none());
    }

    #[test]
    fn reset_all_clears_everything() {
        let mut p = AudioPipeline::new();
        p.append_input_frame(input_frame(1, 20, 960)).unwrap();
        p.reset_all();
        assert_eq!(p.buffered_ms(), 0.0);
        assert_eq!(p.buffered_bytes(), 0);
    }

    #[test]
    fn backpressure_halves_buffer_once_over_30s() {
        let mut p = AudioPipeline::new();
        // 1600 frames of 20ms = 32s, over the 30s threshold.
        for seq in 0..1600u32 {
            p.append_input_frame(input_frame(seq, 20, 960)).unwrap();
        }
        assert!(p.buffered_ms() <= super::BACKPRESSURE_MAX_BUFFERED_MS / 2.0 + 20.0);
    }
}
