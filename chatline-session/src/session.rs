//! Session State Holder
//!
//! [`ChatSession`] owns the active conversation, the conversation list and
//! the counterpart's typing status, and exposes the user intents of the view
//! layer: select, start-new, send and notify-typing.
//!
//! ## Concurrency
//!
//! State lives in a [`SessionContext`] shared with the
//! [`EventReconciler`](crate::reconciler::EventReconciler). No lock is held
//! across an API or transport call. Every continuation re-reads the state it
//! depends on and drops its result if the world moved on:
//!
//! - selection epoch: bumped by select, start-new and close
//! - conversation identity: a send only appends to the conversation it was
//!   issued for
//! - list generation: an older list response never replaces a newer one
//!
//! Every change is published to subscribers as a [`SessionSnapshot`].

use crate::api::{ConversationApi, NewMessage};
use crate::config::SessionConfig;
use crate::event::OutboundEvent;
use crate::model::{
    ActiveConversation, ConversationSummary, Counterpart, CurrentUser, Message, SessionSnapshot,
    TypingState,
};
use crate::reconciler::EventReconciler;
use crate::transport::RealtimeTransport;
use crate::typing::TypingDebouncer;
use crate::{ChatError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of a selection once its response arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The conversation is now active
    Applied,

    /// A later selection was made while this one was in flight; the
    /// response was dropped
    Superseded,
}

/// Mutable session state
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) conversations: Vec<ConversationSummary>,
    pub(crate) active: Option<ActiveConversation>,
    pub(crate) typing: TypingState,
    pub(crate) notice: Option<String>,
    selection_epoch: u64,
    list_requested: u64,
    list_applied: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversations: self.conversations.clone(),
            active: self.active.clone(),
            counterpart_typing: self.active.is_some() && self.typing.is_active(Instant::now()),
            notice: self.notice.clone(),
        }
    }

    /// Start a new selection, superseding any in flight
    fn begin_selection(&mut self) -> u64 {
        self.selection_epoch += 1;
        self.selection_epoch
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.selection_epoch == epoch
    }

    /// Replace the active conversation and reset everything tied to it
    fn activate(&mut self, conversation: Option<ActiveConversation>) {
        self.active = conversation;
        self.typing.clear();
        self.notice = None;
    }
}

/// State and collaborators shared by the session and its reconciler
#[derive(Debug)]
pub(crate) struct SessionContext {
    pub(crate) user: CurrentUser,
    pub(crate) api: Arc<dyn ConversationApi>,
    pub(crate) config: SessionConfig,
    pub(crate) state: RwLock<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionContext {
    pub(crate) fn new(
        user: CurrentUser,
        api: Arc<dyn ConversationApi>,
        config: SessionConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            user,
            api,
            config,
            state: RwLock::new(SessionState::default()),
            snapshots,
        }
    }

    /// Push the current state to subscribers
    pub(crate) fn publish(&self, state: &SessionState) {
        self.snapshots.send_replace(state.snapshot());
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Fetch the conversation list and apply it unless a newer one already
    /// landed
    pub(crate) async fn refresh_conversations(&self) -> Result<()> {
        let ticket = {
            let mut state = self.state.write().await;
            state.list_requested += 1;
            state.list_requested
        };

        let conversations = self.api.list_conversations(&self.user.user_id).await?;

        let mut state = self.state.write().await;
        if ticket <= state.list_applied {
            debug!(
                "Dropping stale conversation list (request {}, applied {})",
                ticket, state.list_applied
            );
            return Ok(());
        }
        state.list_applied = ticket;
        state.conversations = conversations;
        debug!("Conversation list updated ({} entries)", state.conversations.len());
        self.publish(&state);
        Ok(())
    }

    /// Refresh the list, logging instead of failing
    pub(crate) async fn refresh_conversations_logged(&self) {
        if let Err(e) = self.refresh_conversations().await {
            warn!("Failed to refresh conversation list: {}", e);
        }
    }

    /// Surface an error as the user-visible notice
    async fn report(&self, error: &ChatError) {
        let mut state = self.state.write().await;
        state.notice = Some(error.user_message());
        self.publish(&state);
    }
}

/// Client-side chat session for one signed-in user
///
/// # Examples
///
/// ```rust,ignore
/// let session = ChatSession::new(user, api, transport, SessionConfig::default());
/// session.start().await?;
///
/// session.select_conversation("bob@x.com").await?;
/// session.notify_typing().await;
/// session.send_message("hi").await?;
///
/// let mut snapshots = session.subscribe();
/// while snapshots.changed().await.is_ok() {
///     render(&snapshots.borrow());
/// }
/// ```
#[derive(Debug)]
pub struct ChatSession {
    id: Uuid,
    context: Arc<SessionContext>,
    transport: Arc<dyn RealtimeTransport>,
    debouncer: TypingDebouncer,
    reconciler: EventReconciler,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl ChatSession {
    pub fn new(
        user: CurrentUser,
        api: Arc<dyn ConversationApi>,
        transport: Arc<dyn RealtimeTransport>,
        config: SessionConfig,
    ) -> Self {
        let debouncer = TypingDebouncer::new(
            transport.clone(),
            user.email.clone(),
            config.typing_quiet_period(),
        );
        let context = Arc::new(SessionContext::new(user, api, config));
        let reconciler = EventReconciler::new(context.clone());

        Self {
            id: Uuid::new_v4(),
            context,
            transport,
            debouncer,
            reconciler,
            dispatch: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user(&self) -> &CurrentUser {
        &self.context.user
    }

    /// Register with the real-time service and start reconciling events
    ///
    /// Registers and subscribes exactly once, spawns the dispatch loop and
    /// performs the initial conversation list fetch. A failed list fetch is
    /// logged and does not fail startup.
    ///
    /// # Errors
    ///
    /// `ChatError::InvalidState` if the session was already started, or the
    /// transport error if registration fails.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ChatError::invalid_state("session already started"));
        }

        info!(
            "Starting chat session {} for {}",
            self.id, self.context.user.email
        );

        self.transport.register(&self.context.user.user_id).await?;
        let events = self.transport.subscribe().await?;
        *self.dispatch.lock().await = Some(self.reconciler.clone().spawn(events));

        self.context.refresh_conversations_logged().await;
        Ok(())
    }

    /// Open the conversation with `counterpart_email`, creating it if needed
    ///
    /// # Errors
    ///
    /// `ChatError::ValidationFailed` for an empty email,
    /// `ChatError::UserNotFound` if no account uses it, or the API error.
    /// The active conversation is left unchanged on failure.
    pub async fn select_conversation(&self, counterpart_email: &str) -> Result<SelectionOutcome> {
        let email = self.validate_email(counterpart_email).await?;
        let epoch = self.context.state.write().await.begin_selection();
        debug!("Selecting conversation with {} (epoch {})", email, epoch);

        let result = self
            .context
            .api
            .get_or_create_conversation(&self.context.user.user_id, email)
            .await;

        let details = match result {
            Ok(details) => details,
            Err(e) => return Err(self.selection_failed(epoch, email, e).await),
        };

        let counterpart = Counterpart {
            user_id: details.receiver_id,
            email: details.target_email.unwrap_or_else(|| email.to_string()),
        };
        let summary = format!(
            "{} with {} ({} messages)",
            details.conversation_id,
            counterpart.email,
            details.messages.len()
        );
        let conversation =
            ActiveConversation::established(details.conversation_id, counterpart, details.messages);

        if !self.activate(epoch, Some(conversation)).await {
            debug!("Dropping superseded selection of {}", email);
            return Ok(SelectionOutcome::Superseded);
        }
        info!("Opened conversation {}", summary);

        self.debouncer.cancel().await;
        self.context.refresh_conversations_logged().await;
        Ok(SelectionOutcome::Applied)
    }

    /// Start a chat with `counterpart_email` without creating anything
    /// server-side
    ///
    /// The conversation stays pending until the first message is sent.
    ///
    /// # Errors
    ///
    /// `ChatError::ValidationFailed` for an empty email,
    /// `ChatError::UserNotFound` if no account uses it.
    pub async fn start_new_chat(&self, counterpart_email: &str) -> Result<SelectionOutcome> {
        let email = self.validate_email(counterpart_email).await?;
        let epoch = self.context.state.write().await.begin_selection();
        debug!("Starting new chat with {} (epoch {})", email, epoch);

        let user_id = match self.context.api.verify_user(email).await {
            Ok(user_id) => user_id,
            Err(e) => return Err(self.selection_failed(epoch, email, e).await),
        };

        let conversation = ActiveConversation::pending(Counterpart {
            user_id,
            email: email.to_string(),
        });
        if !self.activate(epoch, Some(conversation)).await {
            debug!("Dropping superseded new chat with {}", email);
            return Ok(SelectionOutcome::Superseded);
        }
        info!("Started pending conversation with {}", email);

        self.debouncer.cancel().await;
        Ok(SelectionOutcome::Applied)
    }

    /// Send a message to the active conversation
    ///
    /// A pending conversation is created server-side first. The message is
    /// appended locally only after the server confirmed it, and only if the
    /// same conversation is still open.
    ///
    /// Not atomic: if the post fails after a pending conversation was
    /// created, the conversation exists server-side without messages.
    ///
    /// # Errors
    ///
    /// `ChatError::ValidationFailed` for empty content,
    /// `ChatError::InvalidState` without an active conversation, and
    /// `ChatError::SendFailed` if the server rejected the message.
    pub async fn send_message(&self, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(self.fail(ChatError::validation("message is empty")).await);
        }

        let target = {
            let state = self.context.state.read().await;
            state.active.as_ref().map(|active| {
                (
                    active.conversation_id().map(str::to_string),
                    active.counterpart().clone(),
                )
            })
        };
        let Some((conversation_id, counterpart)) = target else {
            return Err(self
                .fail(ChatError::invalid_state("no conversation is open"))
                .await);
        };

        self.debouncer.notify_send().await;

        let result = match conversation_id {
            Some(conversation_id) => {
                self.send_to_established(&conversation_id, &counterpart, content)
                    .await
            }
            None => self.send_to_pending(&counterpart, content).await,
        };

        match result {
            Ok(message) => {
                self.context.refresh_conversations_logged().await;
                Ok(message)
            }
            Err(e) => {
                warn!("Failed to send message to {}: {}", counterpart.email, e);
                Err(self.fail(ChatError::SendFailed(e.to_string())).await)
            }
        }
    }

    async fn send_to_established(
        &self,
        conversation_id: &str,
        counterpart: &Counterpart,
        content: &str,
    ) -> Result<Message> {
        let message = self
            .post(conversation_id, &counterpart.user_id, content)
            .await?;

        {
            let mut guard = self.context.state.write().await;
            let state = &mut *guard;
            match state.active.as_mut().filter(|a| a.is(conversation_id)) {
                Some(active) => {
                    if !active.append(message.clone()) {
                        debug!("Message {} already delivered in real time", message.id);
                    }
                    state.notice = None;
                    self.context.publish(state);
                }
                None => debug!(
                    "Conversation {} no longer open, not appending {}",
                    conversation_id, message.id
                ),
            }
        }

        self.broadcast(&counterpart.user_id, &message).await;
        Ok(message)
    }

    async fn send_to_pending(
        &self,
        counterpart: &Counterpart,
        content: &str,
    ) -> Result<Message> {
        let details = self
            .context
            .api
            .get_or_create_conversation(&self.context.user.user_id, &counterpart.email)
            .await?;
        let message = self
            .post(&details.conversation_id, &details.receiver_id, content)
            .await?;

        {
            let mut guard = self.context.state.write().await;
            let state = &mut *guard;
            // Failed or superseded selections leave the pending chat open
            let still_pending = state.active.as_ref().is_some_and(|a| {
                a.is_pending() && a.counterpart().user_id == counterpart.user_id
            });

            if still_pending {
                let mut conversation = ActiveConversation::established(
                    details.conversation_id.clone(),
                    Counterpart {
                        user_id: details.receiver_id.clone(),
                        email: counterpart.email.clone(),
                    },
                    details.messages,
                );
                conversation.append(message.clone());
                info!(
                    "Pending conversation with {} is now {}",
                    counterpart.email, details.conversation_id
                );
                state.active = Some(conversation);
                state.notice = None;
                self.context.publish(state);
            } else if let Some(active) = state
                .active
                .as_mut()
                .filter(|a| a.is(&details.conversation_id))
            {
                // A concurrent send already established it
                active.append(message.clone());
                self.context.publish(state);
            } else {
                debug!(
                    "Pending conversation with {} no longer open, not appending {}",
                    counterpart.email, message.id
                );
            }
        }

        self.broadcast(&details.receiver_id, &message).await;
        Ok(message)
    }

    async fn post(
        &self,
        conversation_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<Message> {
        let mut message = self
            .context
            .api
            .post_message(NewMessage {
                conversation_id: conversation_id.to_string(),
                sender: self.context.user.user_id.clone(),
                receiver: receiver_id.to_string(),
                content: content.to_string(),
            })
            .await?;

        if message.conversation_id.is_empty() {
            message.conversation_id = conversation_id.to_string();
        }
        Ok(message)
    }

    /// Relay a confirmed message to the counterpart
    async fn broadcast(&self, receiver_id: &str, message: &Message) {
        let event = OutboundEvent::SendMessage {
            receiver_id: receiver_id.to_string(),
            message: message.clone(),
        };
        if let Err(e) = self.transport.emit(event).await {
            warn!("Message {} saved but not relayed: {}", message.id, e);
        }
    }

    /// Record a keystroke in the message input
    pub async fn notify_typing(&self) {
        let receiver_id = {
            let state = self.context.state.read().await;
            state.active.as_ref().map(|a| a.counterpart().user_id.clone())
        };

        match receiver_id {
            Some(receiver_id) => self.debouncer.notify_local_typing(&receiver_id).await,
            None => debug!("Ignoring typing without an open conversation"),
        }
    }

    /// Leave the active conversation
    pub async fn close_conversation(&self) {
        {
            let mut expiry = self.reconciler.typing_expiry().await;
            let mut state = self.context.state.write().await;
            state.begin_selection();
            if let Some(active) = &state.active {
                info!("Closing conversation with {}", active.counterpart().email);
            }
            state.activate(None);
            self.context.publish(&state);
            if let Some(previous) = expiry.take() {
                previous.abort();
            }
        }
        self.debouncer.cancel().await;
    }

    /// Re-fetch the conversation list
    pub async fn refresh_conversations(&self) -> Result<()> {
        self.context.refresh_conversations().await
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.context.snapshot()
    }

    /// Receive a snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.context.subscribe()
    }

    /// Handle for feeding events without a transport subscription
    pub fn reconciler(&self) -> &EventReconciler {
        &self.reconciler
    }

    /// Stop typing, stop reconciling and close the transport
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down chat session {}", self.id);
        self.debouncer.cancel().await;
        self.reconciler.cancel_typing_expiry().await;
        if let Some(dispatch) = self.dispatch.lock().await.take() {
            dispatch.abort();
        }
        self.transport.close().await
    }

    async fn validate_email<'a>(&self, email: &'a str) -> Result<&'a str> {
        let email = email.trim();
        if email.is_empty() {
            return Err(self.fail(ChatError::validation("email is empty")).await);
        }
        Ok(email)
    }

    /// Make `conversation` active unless selection `epoch` was superseded
    ///
    /// Clears the counterpart typing indicator and its expiry.
    async fn activate(&self, epoch: u64, conversation: Option<ActiveConversation>) -> bool {
        let mut expiry = self.reconciler.typing_expiry().await;
        let mut state = self.context.state.write().await;
        if !state.is_current(epoch) {
            return false;
        }

        state.activate(conversation);
        self.context.publish(&state);
        if let Some(previous) = expiry.take() {
            previous.abort();
        }
        true
    }

    async fn fail(&self, error: ChatError) -> ChatError {
        self.context.report(&error).await;
        error
    }

    /// Report a failed selection unless it was already superseded
    async fn selection_failed(&self, epoch: u64, email: &str, error: ChatError) -> ChatError {
        let current = self.context.state.read().await.is_current(epoch);
        if current {
            warn!("Failed to open conversation with {}: {}", email, error);
            self.context.report(&error).await;
        } else {
            debug!("Superseded selection of {} failed: {}", email, error);
        }
        error
    }
}
