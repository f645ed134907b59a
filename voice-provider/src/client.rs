//! WebSocket transport to the hosted realtime model: connects, authenticates,
//! and exposes a raw send/receive pair the adapter builds protocol semantics on top of.

use std::time::Duration;

use base64::Engine;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{parse_event, RawEvent};

pub const DEFAULT_WEBSOCKET_URL: &str = "wss://api.openai.com/v1/realtime";
const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub url: String,
    pub model: String,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: DEFAULT_WEBSOCKET_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> Client {
        Client { config: self.config }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Opens the socket and starts the read/write pump tasks.
    pub async fn connect(&self) -> Result<WebSocketSession> {
        if self.config.api_key.is_empty() {
            return Err(Error::InvalidConfig("api_key is empty".into()));
        }
        let url = format!("{}?model={}", self.config.url, self.config.model);
        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("OpenAI-Beta", "realtime=v1")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_websocket_key())
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", extract_host(&url).unwrap_or("api.openai.com"))
            .body(())
            .map_err(|e| Error::Connection(format!("failed to build request: {e}")))?;

        let connect_fut = tokio_tungstenite::connect_async(request);
        let (stream, _response) = tokio::time::timeout(self.config.connect_timeout, connect_fut)
            .await
            .map_err(|_| Error::Timeout("provider websocket connect".into()))?
            .map_err(Error::WebSocket)?;

        Ok(WebSocketSession::spawn(stream))
    }
}

/// A live, running connection: a write sink driven by sending `Message`s
/// through `write_tx`, and an event stream drained through `recv()`.
pub struct WebSocketSession {
    write_tx: mpsc::UnboundedSender<Message>,
    event_rx: mpsc::UnboundedReceiver<RawEvent>,
    _reader: tokio::task::JoinHandle<()>,
    _writer: tokio::task::JoinHandle<()>,
}

impl WebSocketSession {
    fn spawn(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        let (mut sink, mut source) = stream.split();
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<RawEvent>();

        let writer = tokio::spawn(async move {
            while let Some(message) = write_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "provider websocket write failed");
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        debug!(payload = %truncate_for_log(&text), "provider event");
                        match parse_event(&text) {
                            Ok(event) => {
                                if event_tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "malformed provider event"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        Self {
            write_tx,
            event_rx,
            _reader: reader,
            _writer: writer,
        }
    }

    pub fn send_raw(&self, value: &serde_json::Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.write_tx
            .send(Message::Text(text.into()))
            .map_err(|_| Error::SessionClosed)
    }

    pub async fn recv(&mut self) -> Option<RawEvent> {
        self.event_rx.recv().await
    }

    pub fn close(&self) {
        let _ = self.write_tx.send(Message::Close(None));
    }
}

fn generate_websocket_key() -> String {
    let mut bytes = [0u8; 16];
    for b in bytes.iter_mut() {
        *b = rand_byte();
    }
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn rand_byte() -> u8 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    (nanos ^ count.wrapping_mul(0x9E3779B97F4A7C15)) as u8
}

fn extract_host(url: &str) -> Option<&str> {
    url.strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .and_then(|s| s.split('/').next())
        .and_then(|s| s.split('?').next())
}

fn truncate_for_log(text: &str) -> String {
    const MAX: usize = 200;
    if text.len() <= MAX {
        text.to_string()
    } else {
        format!("{}... ({} bytes)", &text[..MAX], text.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_key_is_24_base64_chars() {
        let key = generate_websocket_key();
        assert_eq!(key.len(), 24);
    }

    #[test]
    fn truncate_for_log_leaves_short_text_untouched() {
        assert_eq!(truncate_for_log("hello"), "hello");
    }

    #[test]
    fn truncate_for_log_shortens_long_text() {
        let long = "x".repeat(500);
        let truncated = truncate_for_log(&long);
        assert!(truncated.len() < long.len());
        assert!(truncated.contains("500 bytes"));
    }

    #[test]
    fn connect_rejects_empty_api_key() {
        let client = Client::builder().build();
        let result = tokio_test_block_on(client.connect());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }
}
