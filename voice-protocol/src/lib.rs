//! Control envelope and binary audio frame codec for the voice session engine.
//!
//! This crate owns the session boundary wire format: the JSON control
//! envelope and the compact binary audio frame header. Nothing here knows
//! about sessions, turns, or providers, it only builds and validates bytes.

mod envelope;
mod frame;
mod time;

pub use envelope::{
    build_envelope, new_msg_id, validate_envelope, validate_envelope_value, Envelope,
    EnvelopeError, EnvelopeErrorCode, EnvelopeType, ValidateOptions, PROTOCOL_VERSION,
};
pub use frame::{AudioCodec, AudioFrame, FrameError, FrameKind};
pub use time::Millis;
