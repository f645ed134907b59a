//! Turn boundary detection: VAD, barge-in confirmation, and semantic
//! end-of-turn, fused into a single `TurnManager` event stream.

mod manager;
mod semantic_eot;
mod vad;

pub use manager::{TurnDetectionMode, TurnEvent, TurnManager, TurnManagerConfig};
pub use semantic_eot::{
    classify_heuristic, EotStatus, EotVerdict, SemanticEot, SemanticEotBackend, SemanticEotConfig,
    SemanticEotError,
};
pub use vad::{rms_i16, samples_from_pcm16_le, Vad, VadConfig, VadEvent};
