//! Session-level error type. VoiceSession converts these (and the errors of
//! the components it owns) into outgoing `warning`/`error` envelopes; it
//! never lets a handler panic or unwind out of the operation chain.

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not started")]
    NotStarted,

    #[error("session already started")]
    AlreadyStarted,

    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] voice_protocol::EnvelopeError),

    #[error("invalid audio frame: {0}")]
    InvalidFrame(#[from] voice_protocol::FrameError),

    #[error("audio pipeline error: {0}")]
    Pipeline(#[from] voice_audio::AudioPipelineError),

    #[error("provider error: {0}")]
    Provider(#[from] voice_provider::Error),

    #[error("unsupported envelope type: {0}")]
    UnsupportedType(String),

    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),
}

impl SessionError {
    /// The stable wire code for this failure, used on the outgoing `error`
    /// or `warning` envelope.
    pub fn wire_code(&self) -> &'static str {
        match self {
            SessionError::NotStarted | SessionError::AlreadyStarted => "bad_shape",
            SessionError::InvalidEnvelope(e) => match e.code {
                voice_protocol::EnvelopeErrorCode::BadJson => "bad_json",
                voice_protocol::EnvelopeErrorCode::BadShape => "bad_shape",
                voice_protocol::EnvelopeErrorCode::BadType => "bad_type",
                voice_protocol::EnvelopeErrorCode::BadVersion => "bad_version",
                voice_protocol::EnvelopeErrorCode::MissingSessionId => "missing_session_id",
            },
            SessionError::InvalidFrame(_) => "bad_shape",
            SessionError::Pipeline(_) => "buffer_too_small",
            SessionError::Provider(_) => "upstream_error",
            SessionError::UnsupportedType(_) => "unsupported_type",
            SessionError::Transport(_) => "transport_error",
        }
    }

    /// Whether this failure should tear the session down (`error{fatal:true}`)
    /// versus being surfaced as a non-fatal warning/error envelope.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Provider(voice_provider::Error::SessionClosed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_started_maps_to_bad_shape() {
        assert_eq!(SessionError::NotStarted.wire_code(), "bad_shape");
    }

    #[test]
    fn unsupported_type_maps_to_its_own_code() {
        let err = SessionError::UnsupportedType("foo.bar".into());
        assert_eq!(err.wire_code(), "unsupported_type");
        assert!(!err.is_fatal());
    }

    #[test]
    fn session_closed_provider_error_is_fatal() {
        let err = SessionError::Provider(voice_provider::Error::SessionClosed);
        assert!(err.is_fatal());
    }
}
