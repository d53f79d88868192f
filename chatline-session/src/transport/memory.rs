//! In-process Transport
//!
//! A transport that keeps everything in memory: emitted events are recorded
//! with the time they were sent, and inbound events are injected through
//! [`MemoryTransport::deliver`]. Used for offline runs and tests.

use super::RealtimeTransport;
use crate::event::{InboundEvent, OutboundEvent};
use crate::{ChatError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::debug;

/// Default inbound queue capacity
const DEFAULT_BUFFER: usize = 64;

/// In-memory real-time transport
#[derive(Debug)]
pub struct MemoryTransport {
    emitted: Mutex<Vec<(Instant, OutboundEvent)>>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundEvent>>>,
    connected: AtomicBool,
    fail_emits: AtomicBool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(buffer.max(1));
        Self {
            emitted: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            connected: AtomicBool::new(true),
            fail_emits: AtomicBool::new(false),
        }
    }

    /// Inject an inbound event as if the service had pushed it
    pub async fn deliver(&self, event: InboundEvent) -> Result<()> {
        self.inbound_tx
            .send(event)
            .await
            .map_err(|_| ChatError::transport("inbound subscriber dropped"))
    }

    /// Make subsequent emits fail, simulating a broken connection
    pub fn set_fail_emits(&self, fail: bool) {
        self.fail_emits.store(fail, Ordering::SeqCst);
    }

    /// All events emitted so far
    pub async fn emitted(&self) -> Vec<OutboundEvent> {
        self.emitted
            .lock()
            .await
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// All events emitted so far with their emission time
    pub async fn emitted_at(&self) -> Vec<(Instant, OutboundEvent)> {
        self.emitted.lock().await.clone()
    }

    /// Emitted typing signals as `(time, is_typing)` pairs
    pub async fn typing_signals(&self) -> Vec<(Instant, bool)> {
        self.emitted
            .lock()
            .await
            .iter()
            .filter_map(|(at, event)| match event {
                OutboundEvent::Typing { is_typing, .. } => Some((*at, *is_typing)),
                _ => None,
            })
            .collect()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeTransport for MemoryTransport {
    async fn emit(&self, event: OutboundEvent) -> Result<()> {
        if !self.is_connected() {
            return Err(ChatError::transport("connection closed"));
        }
        if self.fail_emits.load(Ordering::SeqCst) {
            return Err(ChatError::transport("simulated emit failure"));
        }
        debug!("Emitting {} event", event.name());
        self.emitted.lock().await.push((Instant::now(), event));
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
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
