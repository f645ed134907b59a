//! Errors raised by the audio pipeline.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AudioPipelineError {
    /// `consume_commit_snapshot` called with nothing buffered.
    #[error("empty_buffer")]
    EmptyBuffer,
    /// `consume_commit_snapshot` called with less than the configured minimum.
    #[error("buffer_too_small")]
    BufferTooSmall,
    /// A frame was appended with the wrong `kind` for the target queue.
    #[error("mismatched frame kind")]
    MismatchedKind,
}
