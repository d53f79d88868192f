//! Conversation API
//!
//! Interface of the external HTTP service that owns users, conversations and
//! messages. The session only talks to it through [`ConversationApi`], so
//! the HTTP client can be swapped for an in-process implementation.

pub mod http;

use crate::model::{ConversationSummary, Message};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub use http::{HttpConversationApi, HttpConversationApiConfig};

/// Canonical conversation between the current user and a counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetails {
    pub conversation_id: String,

    /// User ID of the counterpart
    pub receiver_id: String,

    #[serde(default)]
    pub target_email: Option<String>,

    /// Full history, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Message about to be posted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender: String,
    pub receiver: String,
    pub content: String,
}

/// Users, conversations and messages held by the chat server
#[async_trait]
pub trait ConversationApi: Send + Sync + Debug {
    /// Resolve a counterpart email to a user ID
    ///
    /// # Errors
    ///
    /// `ChatError::UserNotFound` if no account uses `email`.
    async fn verify_user(&self, email: &str) -> Result<String>;

    /// Fetch the conversation between `user_id` and `target_email`,
    /// creating it if it does not exist yet
    ///
    /// Idempotent for a given pair: repeated calls return the same
    /// conversation ID.
    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        target_email: &str,
    ) -> Result<ConversationDetails>;

    /// List the user's conversations
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>>;

    /// Persist a message and return it as stored
    async fn post_message(&self, message: NewMessage) -> Result<Message>;
}
