//! Chatline Session Core
//!
//! This library keeps a two-party chat client in sync with its server:
//! it reconciles REST-fetched conversation state with real-time push events,
//! suppresses duplicate messages and debounces typing indicators.
//!
//! ## Components
//!
//! - [`ChatSession`]: session state holder and user intents
//! - [`EventReconciler`]: merges inbound real-time events into the session
//! - [`TypingDebouncer`]: keystrokes to rate-limited typing signals
//! - [`ConversationApi`] / [`HttpConversationApi`]: the chat server's REST API
//! - [`RealtimeTransport`] / [`WsTransport`]: the real-time event channel

pub mod api;
pub mod config;
pub mod event;
pub mod model;
pub mod reconciler;
pub mod session;
pub mod transport;
pub mod typing;

mod error;

pub use api::{
    ConversationApi, ConversationDetails, HttpConversationApi, HttpConversationApiConfig,
    NewMessage,
};
pub use config::SessionConfig;
pub use error::{ChatError, Result};
pub use event::{Envelope, InboundEvent, OutboundEvent};
pub use model::{
    ActiveConversation, ConversationSummary, Counterpart, CurrentUser, Message, SessionSnapshot,
    TypingState, EMPTY_PREVIEW,
};
pub use reconciler::EventReconciler;
pub use session::{ChatSession, SelectionOutcome};
pub use transport::{MemoryTransport, RealtimeTransport, WsTransport, WsTransportConfig};
pub use typing::{TypingDebouncer, TypingPhase};

#[cfg(test)]
pub(crate) mod test_utils;
