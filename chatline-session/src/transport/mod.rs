//! Real-time Transport Layer
//!
//! The real-time service delivers `receiveMessage` and `userTyping` events
//! and accepts `register`, `sendMessage` and `typing` events from the client.
//! Implementations share a common trait so the session can run against a
//! WebSocket connection or an in-process channel.

mod r#trait;
pub mod memory;
pub mod ws;

pub use memory::MemoryTransport;
pub use r#trait::RealtimeTransport;
pub use ws::{WsTransport, WsTransportConfig};
