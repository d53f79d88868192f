//! Test fixtures shared by the session and reconciler tests

use crate::api::{ConversationApi, ConversationDetails, NewMessage};
use crate::model::{ConversationSummary, CurrentUser, Message};
use crate::{ChatError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

pub fn alice() -> CurrentUser {
    CurrentUser::new("u-alice", "alice@x.com")
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap()
}

pub fn message(id: &str, conversation_id: &str, sender: &str, content: &str) -> Message {
    Message {
        id: id.to_string(),
        sender: sender.to_string(),
        receiver: if sender == "u-alice" { "u-bob" } else { "u-alice" }.to_string(),
        content: content.to_string(),
        created_at: base_time(),
        conversation_id: conversation_id.to_string(),
    }
}

#[derive(Debug)]
struct StoredConversation {
    id: String,
    participants: [String; 2],
    messages: Vec<Message>,
}

#[derive(Debug, Default)]
struct FakeState {
    conversations: Vec<StoredConversation>,
    next_message: u64,
    list_calls: usize,
    post_calls: usize,
    fail_posts: bool,
    list_delays: VecDeque<Duration>,
}

/// In-memory chat server with per-counterpart latency injection
#[derive(Debug)]
pub struct FakeApi {
    users: HashMap<String, String>,
    lookup_delays: HashMap<String, Duration>,
    post_delay: Duration,
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        let users = [
            ("alice@x.com", "u-alice"),
            ("bob@x.com", "u-bob"),
            ("carol@x.com", "u-carol"),
        ]
        .into_iter()
        .map(|(email, id)| (email.to_string(), id.to_string()))
        .collect();

        Self {
            users,
            lookup_delays: HashMap::new(),
            post_delay: Duration::ZERO,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Delay conversation lookups for `email`
    pub fn with_lookup_delay(mut self, email: &str, delay: Duration) -> Self {
        self.lookup_delays.insert(email.to_string(), delay);
        self
    }

    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }

    /// Delays applied to the next list calls, in call order
    pub async fn queue_list_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        self.state.lock().await.list_delays.extend(delays);
    }

    pub async fn set_fail_posts(&self, fail: bool) {
        self.state.lock().await.fail_posts = fail;
    }

    pub async fn list_calls(&self) -> usize {
        self.state.lock().await.list_calls
    }

    pub async fn post_calls(&self) -> usize {
        self.state.lock().await.post_calls
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.lock().await.conversations.len()
    }

    /// Store a message directly, as if another client had posted it
    pub async fn seed_message(&self, conversation_id: &str, message: Message) {
        let mut state = self.state.lock().await;
        if let Some(conversation) = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            conversation.messages.push(message);
        }
    }

    fn user_id(&self, email: &str) -> Result<String> {
        self.users
            .get(email)
            .cloned()
            .ok_or_else(|| ChatError::UserNotFound(email.to_string()))
    }

    fn summaries(state: &FakeState, user_id: &str) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> = state
            .conversations
            .iter()
            .filter(|c| c.participants.iter().any(|p| p == user_id))
            .map(|c| {
                let other = c
                    .participants
                    .iter()
                    .find(|p| *p != user_id)
                    .cloned()
                    .unwrap_or_default();
                let email = other.trim_start_matches("u-").to_string() + "@x.com";
                let last = c.messages.last();
                ConversationSummary {
                    id: c.id.clone(),
                    counterpart_email: email,
                    last_message: last.map(|m| m.content.clone()),
                    last_activity: last.map(|m| m.created_at),
                    unread: false,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        summaries
    }
}

#[async_trait]
impl ConversationApi for FakeApi {
    async fn verify_user(&self, email: &str) -> Result<String> {
        self.user_id(email)
    }

    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        target_email: &str,
    ) -> Result<ConversationDetails> {
        if let Some(delay) = self.lookup_delays.get(target_email) {
            tokio::time::sleep(*delay).await;
        }
        let receiver_id = self.user_id(target_email)?;

        let mut state = self.state.lock().await;
        let existing = state.conversations.iter().position(|c| {
            c.participants.contains(&user_id.to_string()) && c.participants.contains(&receiver_id)
        });
        let index = match existing {
            Some(index) => index,
            None => {
                let id = format!("c-{}", state.conversations.len() + 1);
                state.conversations.push(StoredConversation {
                    id,
                    participants: [user_id.to_string(), receiver_id.clone()],
                    messages: Vec::new(),
                });
                state.conversations.len() - 1
            }
        };

        let conversation = &state.conversations[index];
        Ok(ConversationDetails {
            conversation_id: conversation.id.clone(),
            receiver_id,
            target_email: Some(target_email.to_string()),
            messages: conversation.messages.clone(),
        })
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let (summaries, delay) = {
            let mut state = self.state.lock().await;
            state.list_calls += 1;
            let delay = state.list_delays.pop_front().unwrap_or(Duration::ZERO);
            (Self::summaries(&state, user_id), delay)
        };
        tokio::time::sleep(delay).await;
        Ok(summaries)
    }

    async fn post_message(&self, message: NewMessage) -> Result<Message> {
        tokio::time::sleep(self.post_delay).await;

        let mut state = self.state.lock().await;
        state.post_calls += 1;
        if state.fail_posts {
            return Err(ChatError::RequestFailed("HTTP 500".to_string()));
        }

        state.next_message += 1;
        let stored = Message {
            id: format!("m-{}", state.next_message),
            sender: message.sender,
            receiver: message.receiver,
            content: message.content,
            created_at: base_time() + ChronoDuration::seconds(state.next_message as i64),
            conversation_id: message.conversation_id.clone(),
        };

        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
            .ok_or_else(|| {
                ChatError::NotFound(format!("conversation {}", message.conversation_id))
            })?;
        conversation.messages.push(stored.clone());
        Ok(stored)
    }
}
