//! Conversation Data Model
//!
//! Types shared by the session state holder, the event reconciler and the
//! conversation API. Wire representations use the camelCase field names of
//! the chat server.
//!
//! ## Message Format
//!
//! ```json
//! {
//!     "id": "m-1",
//!     "sender": "u-alice",
//!     "receiver": "u-bob",
//!     "content": "hi",
//!     "createdAt": "2026-01-01T10:00:00Z",
//!     "conversationId": "c-1"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Placeholder preview for conversations without messages
pub const EMPTY_PREVIEW: &str = "No messages yet";

/// A single chat message as confirmed by the server
///
/// Immutable once appended to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned message ID, unique within its conversation
    #[serde(alias = "_id")]
    pub id: String,

    /// User ID of the author
    pub sender: String,

    /// User ID of the recipient
    pub receiver: String,

    /// Message text
    pub content: String,

    /// Creation time as recorded by the server
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Owning conversation
    ///
    /// Some endpoints omit it; the session fills it in from context.
    #[serde(default)]
    pub conversation_id: String,
}

/// Summary of a conversation for list display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation ID
    pub id: String,

    /// Email of the other participant
    #[serde(rename = "email")]
    pub counterpart_email: String,

    /// Content of the latest message
    #[serde(default)]
    pub last_message: Option<String>,

    /// Time of the latest activity
    #[serde(default, rename = "updatedAt")]
    pub last_activity: Option<DateTime<Utc>>,

    /// Whether the conversation holds messages the user has not opened
    #[serde(default, rename = "hasUnread")]
    pub unread: bool,
}

impl ConversationSummary {
    /// Preview text for the list, falling back to a placeholder
    pub fn preview(&self) -> &str {
        self.last_message.as_deref().unwrap_or(EMPTY_PREVIEW)
    }

    /// Fold a newly delivered message into the summary
    pub(crate) fn record_message(&mut self, message: &Message, unread: bool) {
        self.last_message = Some(message.content.clone());
        self.last_activity = Some(message.created_at);
        self.unread = unread;
    }
}

/// The signed-in user the session acts for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_id: String,
    pub email: String,
}

impl CurrentUser {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
        }
    }
}

/// The other participant of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterpart {
    pub user_id: String,
    pub email: String,
}

/// The conversation currently open in the client
///
/// A conversation without an ID is *pending*: the user picked a counterpart
/// but nothing has been persisted server-side yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveConversation {
    conversation_id: Option<String>,
    counterpart: Counterpart,
    messages: Vec<Message>,
}

impl ActiveConversation {
    /// Open an established conversation with its history
    ///
    /// History goes through the same duplicate guard as every other merge
    /// path, so a server response repeating an ID is collapsed.
    pub fn established(
        conversation_id: impl Into<String>,
        counterpart: Counterpart,
        history: impl IntoIterator<Item = Message>,
    ) -> Self {
        let mut conversation = Self {
            conversation_id: Some(conversation_id.into()),
            counterpart,
            messages: Vec::new(),
        };
        for message in history {
            conversation.append(message);
        }
        conversation
    }

    /// Open a pending conversation with no ID and no messages
    pub fn pending(counterpart: Counterpart) -> Self {
        Self {
            conversation_id: None,
            counterpart,
            messages: Vec::new(),
        }
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn counterpart(&self) -> &Counterpart {
        &self.counterpart
    }

    /// Messages in delivery order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_pending(&self) -> bool {
        self.conversation_id.is_none()
    }

    /// Whether this conversation is the one identified by `conversation_id`
    pub fn is(&self, conversation_id: &str) -> bool {
        self.conversation_id.as_deref() == Some(conversation_id)
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.messages.iter().any(|m| m.id == message_id)
    }

    /// Append a message unless one with the same ID is already present
    ///
    /// Returns `true` if the message was inserted. No reordering is done:
    /// messages stay in the order they were delivered.
    pub fn append(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

/// Typing status of the counterpart
///
/// Each update bumps `generation`; an expiry armed for an older generation
/// must not clear a newer status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingState {
    is_typing: bool,
    origin_email: Option<String>,
    generation: u64,
    expires_at: Option<Instant>,
}

impl TypingState {
    /// Record a typing update, returning its generation
    pub(crate) fn update(
        &mut self,
        is_typing: bool,
        origin_email: &str,
        expires_at: Option<Instant>,
    ) -> u64 {
        self.generation += 1;
        self.is_typing = is_typing;
        self.origin_email = Some(origin_email.to_string());
        self.expires_at = if is_typing { expires_at } else { None };
        self.generation
    }

    /// Reset to not-typing
    pub(crate) fn clear(&mut self) {
        self.generation += 1;
        self.is_typing = false;
        self.origin_email = None;
        self.expires_at = None;
    }

    /// Clear only if no newer update arrived since `generation`
    pub(crate) fn expire(&mut self, generation: u64) -> bool {
        if self.generation != generation || !self.is_typing {
            return false;
        }
        self.clear();
        true
    }

    /// Whether the counterpart is typing at `now`
    pub fn is_active(&self, now: Instant) -> bool {
        self.is_typing && self.expires_at.is_none_or(|deadline| now < deadline)
    }

    pub fn origin_email(&self) -> Option<&str> {
        self.origin_email.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Read-only view of the session handed to the view layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    /// Conversation list, most recent first as returned by the server
    pub conversations: Vec<ConversationSummary>,

    /// Open conversation, if any
    pub active: Option<ActiveConversation>,

    /// Whether the counterpart of the open conversation is typing
    pub counterpart_typing: bool,

    /// Last user-visible notice (error text) produced by a user action
    pub notice: Option<String>,
}

impl SessionSnapshot {
    /// Email of the open conversation's counterpart, for list highlighting
    pub fn active_email(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.counterpart().email.as_str())
    }
}
