//! Transport Trait Abstraction
//!
//! Defines the interface of the real-time event channel used by the session.

use crate::event::{InboundEvent, OutboundEvent};
use crate::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::mpsc;

/// Bidirectional event channel to the real-time service
///
/// One connection exists per running session. It is created at session
/// start, handed to the session as a dependency and closed at session end.
#[async_trait]
pub trait RealtimeTransport: Send + Sync + Debug {
    /// Bind this connection to a user identity
    ///
    /// The service routes events addressed to `user_id` to this connection.
    async fn register(&self, user_id: &str) -> Result<()> {
        self.emit(OutboundEvent::Register {
            user_id: user_id.to_string(),
        })
        .await
    }

    /// Send an event
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Transport` if the connection is gone.
    async fn emit(&self, event: OutboundEvent) -> Result<()>;

    /// Take the stream of inbound events
    ///
    /// Succeeds exactly once per connection; later calls fail with
    /// `ChatError::InvalidState`. Delivery order and at-least-once delivery
    /// are not guaranteed beyond what the service provides.
    async fn subscribe(&self) -> Result<mpsc::Receiver<InboundEvent>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the transport is still connected
    fn is_connected(&self) -> bool {
        true
    }
}
