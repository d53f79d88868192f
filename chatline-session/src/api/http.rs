//! HTTP Conversation API Client
//!
//! `reqwest` implementation of [`ConversationApi`] against the chat server's
//! REST endpoints.
//!
//! ## Endpoints
//!
//! | Operation                    | Request                                   |
//! |------------------------------|-------------------------------------------|
//! | `verify_user`                | `POST /chat/verify-user`                  |
//! | `get_or_create_conversation` | `POST /chat/conversation`                 |
//! | `list_conversations`         | `GET /chat/conversations/{userId}`        |
//! | `post_message`               | `POST /chat/message`                      |
//!
//! Error bodies carry a `{"message": "..."}` object which is surfaced to the
//! user unchanged.

use super::{ConversationApi, ConversationDetails, NewMessage};
use crate::model::{ConversationSummary, Message};
use crate::{ChatError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConversationApiConfig {
    /// Server base URL, e.g. `http://localhost:5000/api`
    pub base_url: String,

    /// Bearer token sent with every request
    pub auth_token: Option<String>,

    /// Whole-request timeout
    pub request_timeout: Duration,

    /// Connection establishment timeout
    pub connect_timeout: Duration,
}

impl HttpConversationApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

impl Default for HttpConversationApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyUserResponse {
    user_id: String,
}

#[derive(Deserialize)]
struct ConversationListResponse {
    #[serde(default)]
    conversations: Vec<ConversationSummary>,
}

#[derive(Deserialize)]
struct PostMessageResponse {
    message: Message,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Conversation API over HTTP
#[derive(Debug, Clone)]
pub struct HttpConversationApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpConversationApi {
    pub fn new(config: HttpConversationApiConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and decode a successful JSON body
    ///
    /// `lookup_email` marks requests addressed by counterpart email; a 404
    /// on those means the user does not exist.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        lookup_email: Option<&str>,
    ) -> Result<T> {
        let response = self.authorize(request).send().await?;
        let response = check_status(response, lookup_email).await?;
        Ok(response.json::<T>().await?)
    }
}

async fn check_status(response: Response, lookup_email: Option<&str>) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().path().to_string();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.message)
        .unwrap_or_else(|_| format!("HTTP {} from {}", status.as_u16(), url));

    warn!("Chat API error {} on {}: {}", status.as_u16(), url, message);

    Err(match (status, lookup_email) {
        (StatusCode::NOT_FOUND, Some(email)) => ChatError::UserNotFound(email.to_string()),
        (StatusCode::NOT_FOUND, None) => ChatError::NotFound(message),
        (StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT, _) => {
            ChatError::Timeout(message)
        }
        _ => ChatError::RequestFailed(message),
    })
}

#[async_trait]
impl ConversationApi for HttpConversationApi {
    async fn verify_user(&self, email: &str) -> Result<String> {
        debug!("Verifying user {}", email);
        let request = self
            .client
            .post(self.url("/chat/verify-user"))
            .json(&json!({ "targetEmail": email }));
        let response: VerifyUserResponse = self.send(request, Some(email)).await?;
        Ok(response.user_id)
    }

    async fn get_or_create_conversation(
        &self,
        user_id: &str,
        target_email: &str,
    ) -> Result<ConversationDetails> {
        debug!("Opening conversation with {}", target_email);
        let request = self
            .client
            .post(self.url("/chat/conversation"))
            .json(&json!({ "userId": user_id, "targetEmail": target_email }));
        self.send(request, Some(target_email)).await
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let request = self
            .client
            .get(self.url(&format!("/chat/conversations/{}", user_id)));
        let response: ConversationListResponse = self.send(request, None).await?;
        debug!("Fetched {} conversations", response.conversations.len());
        Ok(response.conversations)
    }

    async fn post_message(&self, message: NewMessage) -> Result<Message> {
        debug!(
            "Posting message to conversation {} ({} chars)",
            message.conversation_id,
            message.content.len()
        );
        let request = self.client.post(self.url("/chat/message")).json(&message);
        let response: PostMessageResponse = self.send(request, None).await?;
        Ok(response.message)
    }
}
