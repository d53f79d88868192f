//! Error handling for the chat session core
//!
//! This module provides the error type shared by the session state holder,
//! the conversation API client and the real-time transports.
//! Errors from underlying libraries are converted using `thiserror`.
//!
//! ## Error Handling Patterns
//!
//! ### Error Propagation
//!
//! Use `?` operator for automatic error propagation:
//!
//! ```rust
//! use chatline_session::Result;
//!
//! fn parse_payload(data: &str) -> Result<serde_json::Value> {
//!     // JSON errors are auto-converted
//!     let value: serde_json::Value = serde_json::from_str(data)?;
//!     Ok(value)
//! }
//! ```
//!
//! ### Error Matching
//!
//! Match on specific variants for custom handling:
//!
//! ```rust
//! use chatline_session::{ChatError, Result};
//!
//! fn describe(result: Result<String>) -> String {
//!     match result {
//!         Ok(user_id) => format!("Found user {}", user_id),
//!         Err(ChatError::UserNotFound(email)) => format!("No account for {}", email),
//!         Err(e) => e.user_message(),
//!     }
//! }
//!
//! assert_eq!(
//!     describe(Err(ChatError::UserNotFound("bob@x.com".to_string()))),
//!     "No account for bob@x.com"
//! );
//! ```
//!
//! ### Logging Errors
//!
//! Failures that are handled locally are logged with `tracing` and turned
//! into a user-visible notice instead of being propagated:
//!
//! ```rust,ignore
//! use tracing::warn;
//!
//! if let Err(e) = context.refresh_conversations().await {
//!     warn!("Failed to refresh conversations: {}", e);
//! }
//! ```
//!
//! ## Error Categories
//!
//! - Lookup failures: `UserNotFound`, `NotFound`
//! - Network/API failures: `RequestFailed`, `Timeout`, `Transport`
//! - Local input failures: `ValidationFailed`, `InvalidState`
//! - Composite: `SendFailed` wraps whatever made a send fail

use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors that can occur while driving a chat session
///
/// # Examples
///
/// ```rust
/// use chatline_session::ChatError;
///
/// let error = ChatError::UserNotFound("bob@x.com".to_string());
/// assert_eq!(error.to_string(), "User not found: bob@x.com");
///
/// let error = ChatError::ValidationFailed("message is empty".to_string());
/// assert_eq!(error.to_string(), "Validation failed: message is empty");
/// ```
#[derive(Error, Debug)]
pub enum ChatError {
    /// Counterpart lookup by email failed
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// A conversation or other resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic network or API failure
    ///
    /// Carries the server supplied message when one was returned.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Local input rejected before any request was made
    ///
    /// # Examples
    ///
    /// ```rust
    /// use chatline_session::ChatError;
    ///
    /// let error = ChatError::validation("email is empty");
    /// assert!(matches!(error, ChatError::ValidationFailed(_)));
    /// assert!(!error.is_recoverable());
    /// ```
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Sending a message failed; nothing was appended locally
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Request or connection timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Real-time transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation attempted in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        ChatError::ValidationFailed(msg.into())
    }

    /// Create an invalid state error
    ///
    /// ```rust
    /// use chatline_session::ChatError;
    ///
    /// let error = ChatError::invalid_state("transport already subscribed");
    /// assert_eq!(error.to_string(), "Invalid state: transport already subscribed");
    /// ```
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        ChatError::InvalidState(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        ChatError::Transport(msg.into())
    }

    /// Whether this is a lookup failure (user or resource)
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::UserNotFound(_) | ChatError::NotFound(_))
    }

    /// Check if repeating the same user action might succeed
    ///
    /// Nothing is retried automatically; this only drives the wording shown
    /// to the user.
    ///
    /// ```rust
    /// use chatline_session::ChatError;
    ///
    /// assert!(ChatError::Timeout("post message".to_string()).is_recoverable());
    /// assert!(!ChatError::UserNotFound("bob@x.com".to_string()).is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChatError::RequestFailed(_)
                | ChatError::Timeout(_)
                | ChatError::Transport(_)
                | ChatError::SendFailed(_)
        )
    }

    /// Get a user-friendly error message suitable for display
    ///
    /// ```rust
    /// use chatline_session::ChatError;
    ///
    /// let error = ChatError::SendFailed("connection reset".to_string());
    /// assert_eq!(error.user_message(), "Failed to send message.");
    /// ```
    pub fn user_message(&self) -> String {
        match self {
            ChatError::UserNotFound(_) => "User not found".to_string(),
            ChatError::NotFound(what) => format!("{} not found.", what),
            ChatError::RequestFailed(msg) => msg.clone(),
            ChatError::ValidationFailed(msg) => format!("{}.", capitalize(msg)),
            ChatError::SendFailed(_) => "Failed to send message.".to_string(),
            ChatError::Timeout(_) => {
                "The server took too long to respond. Check your connection.".to_string()
            }
            ChatError::Transport(_) => {
                "Lost connection to the chat server. Messages may arrive late.".to_string()
            }
            ChatError::InvalidState(msg) => format!("{}.", capitalize(msg)),
            ChatError::Json(_) => "The server sent data the client could not read.".to_string(),
        }
    }
}

fn capitalize(msg: &str) -> String {
    let mut chars = msg.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ChatError::Timeout(error.to_string())
        } else {
            ChatError::RequestFailed(error.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        ChatError::Transport(error.to_string())
    }
}
