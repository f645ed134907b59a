//! Adapter to a hosted realtime speech-to-speech model over WebSocket.

mod adapter;
mod client;
mod error;
mod events;
mod types;

pub use adapter::{new_event_id, AdapterConfig, AIProvider};
pub use client::{Client, ClientBuilder, ClientConfig, WebSocketSession, DEFAULT_WEBSOCKET_URL};
pub use error::{ApiError, Error, Result};
pub use events::{client as wire_client_events, server as wire_server_events, parse_event, RawEvent};
pub use types::{
    AssistantState, Eagerness, InputAudioTranscription, ItemRole, ProviderEvent,
    ResponseCreateOptions, SessionConfig, TurnDetection,
};
