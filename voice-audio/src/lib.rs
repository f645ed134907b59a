//! Ordered input/output audio buffering and commit snapshots.

mod error;
mod pipeline;
mod snapshot;

pub use error::AudioPipelineError;
pub use pipeline::{AudioPipeline, BACKPRESSURE_MAX_BUFFERED_MS};
pub use snapshot::{default_min_commit_bytes, CommitRequest, CommitSnapshot, DEFAULT_MIN_COMMIT_MS};
