//! WebSocket Transport
//!
//! Connects to the real-time service over a WebSocket. Each text frame
//! carries one [`Envelope`](crate::event::Envelope).
//!
//! ## Architecture
//!
//! ```text
//! WsTransport
//!   ├── sink (Mutex)     <- emit() serialises outbound envelopes
//!   └── reader task      -> decodes frames into InboundEvent -> mpsc
//! ```
//!
//! The reader task lives as long as the connection; the receiving end of its
//! channel is handed out once through `subscribe()`.

use super::RealtimeTransport;
use crate::event::{Envelope, InboundEvent, OutboundEvent};
use crate::{ChatError, Result};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WsTransportConfig {
    /// Service URL (`ws://` only, TLS is not compiled in)
    pub url: String,

    /// Handshake timeout
    pub connect_timeout: Duration,

    /// Inbound event queue capacity
    pub event_buffer: usize,
}

impl WsTransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Default for WsTransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:5000".to_string(),
            connect_timeout: Duration::from_secs(10),
            event_buffer: 256,
        }
    }
}

/// Real-time transport over a single WebSocket connection
pub struct WsTransport {
    url: String,
    sink: Mutex<WsSink>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl WsTransport {
    /// Open the connection and start the reader task
    ///
    /// # Errors
    ///
    /// Returns `ChatError::ValidationFailed` for a non-`ws://` URL,
    /// `ChatError::Timeout` if the handshake does not complete in time and
    /// `ChatError::Transport` if it fails.
    pub async fn connect(config: WsTransportConfig) -> Result<Self> {
        if !config.url.starts_with("ws://") {
            return Err(ChatError::validation(format!(
                "unsupported real-time service URL {} (expected ws://)",
                config.url
            )));
        }
        info!("Connecting to real-time service at {}", config.url);

        let (stream, _response) =
            tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()))
                .await
                .map_err(|_| ChatError::Timeout(format!("connecting to {}", config.url)))??;

        let (sink, source) = stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(config.event_buffer.max(1));
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(source, inbound_tx, connected.clone()));

        info!("Connected to real-time service at {}", config.url);

        Ok(Self {
            url: config.url,
            sink: Mutex::new(sink),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            connected,
            reader,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsTransport")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut source: WsSource,
    inbound_tx: mpsc::Sender<InboundEvent>,
    connected: Arc<AtomicBool>,
) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                let decoded =
                    Envelope::from_text(text.as_str()).and_then(InboundEvent::from_envelope);
                match decoded {
                    Ok(Some(event)) => {
                        if inbound_tx.send(event).await.is_err() {
                            debug!("Inbound subscriber dropped, stopping reader");
                            break;
                        }
                    }
                    Ok(None) => debug!("Ignoring unhandled event frame"),
                    Err(e) => warn!("Dropping malformed event: {}", e),
                }
            }
            Ok(WsMessage::Close(frame)) => {
                info!("Real-time service closed the connection: {:?}", frame);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket read error: {}", e);
                break;
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    async fn emit(&self, event: OutboundEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatError::transport(format!(
                "not connected to {}",
                self.url
            )));
        }

        let text = event.to_envelope()?.to_text()?;
        debug!("Emitting {} event", event.name());
        self.sink.lock().await.send(WsMessage::Text(text.into())).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundEvent>> {
        self.inbound_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| ChatError::invalid_state("transport already subscribed"))
    }

    async fn close(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            self.reader.abort();
            return Ok(());
        }

        info!("Closing connection to {}", self.url);
        let result = self.sink.lock().await.close().await;
        self.reader.abort();
        result.map_err(ChatError::from)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
