//! Error types for the realtime adapter.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Api(#[from] ApiError),

    #[error("session closed")]
    SessionClosed,

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

/// An `error` event reported by the provider itself, as opposed to a
/// transport-level failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub code: Option<String>,
    pub message: String,
    pub event_id: Option<String>,
}

impl ApiError {
    pub fn from_event(value: &serde_json::Value) -> Self {
        let err = value.get("error").unwrap_or(value);
        Self {
            code: err
                .get("code")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            message: err
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown provider error")
                .to_string(),
            event_id: value
                .get("event_id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        }
    }

    /// Codes the session should treat as a warning rather than tearing the
    /// session down.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some("invalid_value")
                | Some("unknown_parameter")
                | Some("invalid_request_error")
                | Some("conversation_already_has_active_response")
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}
