//! Event Reconciler
//!
//! Merges inbound real-time events into the session state.
//!
//! The reconciler never captures "the current conversation" when it is
//! created: every event is matched against the state at dispatch time, so a
//! single dispatch loop serves the whole session regardless of how often the
//! user switches conversations.
//!
//! ## Message Events
//!
//! - open conversation: append through the duplicate guard, clear the
//!   counterpart typing indicator
//! - any conversation: update its list entry locally, then refresh the list
//!   from the server in the background
//!
//! ## Typing Events
//!
//! Applied only when the sender is the open conversation's counterpart. The
//! latest event wins. A "typing" indicator expires on its own after
//! `remote_typing_timeout` unless refreshed.

use crate::event::InboundEvent;
use crate::model::Message;
use crate::session::SessionContext;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Applies inbound events to the shared session state
#[derive(Debug, Clone)]
pub struct EventReconciler {
    context: Arc<SessionContext>,
    typing_expiry: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl EventReconciler {
    pub(crate) fn new(context: Arc<SessionContext>) -> Self {
        Self {
            context,
            typing_expiry: Arc::new(Mutex::new(None)),
        }
    }

    /// Run the dispatch loop until the event stream ends
    pub fn spawn(self, mut events: mpsc::Receiver<InboundEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!("Event dispatch loop started");
            while let Some(event) = events.recv().await {
                self.dispatch(event).await;
            }
            info!("Real-time event stream ended");
        })
    }

    pub async fn dispatch(&self, event: InboundEvent) {
        match event {
            InboundEvent::MessageReceived(message) => self.on_message_received(message).await,
            InboundEvent::TypingChanged {
                is_typing,
                sender_email,
            } => self.on_typing_changed(is_typing, &sender_email).await,
        }
    }

    /// A message was posted to one of the user's conversations
    pub async fn on_message_received(&self, message: Message) {
        {
            let mut guard = self.context.state.write().await;
            let state = &mut *guard;

            let is_open = match state.active.as_mut() {
                Some(active) if active.is(&message.conversation_id) => {
                    if active.append(message.clone()) {
                        debug!(
                            "Appended message {} to open conversation {}",
                            message.id, message.conversation_id
                        );
                    } else {
                        debug!("Ignoring duplicate message {}", message.id);
                    }
                    true
                }
                _ => false,
            };

            if is_open {
                state.typing.clear();
            }

            if let Some(summary) = state
                .conversations
                .iter_mut()
                .find(|c| c.id == message.conversation_id)
            {
                summary.record_message(&message, !is_open);
            }

            self.context.publish(state);
        }

        let context = self.context.clone();
        tokio::spawn(async move {
            context.refresh_conversations_logged().await;
        });
    }

    /// The sender of `sender_email` started or stopped typing
    pub async fn on_typing_changed(&self, is_typing: bool, sender_email: &str) {
        let timeout = self.context.config.remote_typing_timeout();
        let mut expiry = self.typing_expiry.lock().await;

        let generation = {
            let mut state = self.context.state.write().await;
            let from_counterpart = state
                .active
                .as_ref()
                .is_some_and(|a| a.counterpart().email.eq_ignore_ascii_case(sender_email));
            if !from_counterpart {
                debug!("Ignoring typing from {} (not the open conversation)", sender_email);
                return;
            }

            let expires_at = Instant::now() + timeout;
            let generation = state.typing.update(is_typing, sender_email, Some(expires_at));
            self.context.publish(&state);
            generation
        };

        if let Some(previous) = expiry.take() {
            previous.abort();
        }
        if !is_typing {
            return;
        }

        let context = self.context.clone();
        *expiry = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut state = context.state.write().await;
            if state.typing.expire(generation) {
                debug!("Counterpart typing indicator expired");
                context.publish(&state);
            }
        }));
    }

    /// Lock the typing indicator expiry slot
    ///
    /// Must be taken before the state lock.
    pub(crate) async fn typing_expiry(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.typing_expiry.lock().await
    }

    /// Drop any pending typing indicator expiry
    pub(crate) async fn cancel_typing_expiry(&self) {
        if let Some(expiry) = self.typing_expiry.lock().await.take() {
            expiry.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionConfig;
    use crate::event::InboundEvent;
    use crate::model::ConversationSummary;
    use crate::session::ChatSession;
    use crate::test_utils::{alice, message, FakeApi};
    use crate::transport::MemoryTransport;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::sleep;

    async fn session_with_bob() -> (Arc<FakeApi>, ChatSession) {
        let api = Arc::new(FakeApi::new());
        let session = ChatSession::new(
            alice(),
            api.clone(),
            Arc::new(MemoryTransport::new()),
            SessionConfig::default(),
        );
        session.select_conversation("bob@x.com").await.unwrap();
        (api, session)
    }

    fn summary<'a>(
        conversations: &'a [ConversationSummary],
        id: &str,
    ) -> &'a ConversationSummary {
        conversations
            .iter()
            .find(|c| c.id == id)
            .expect("summary should exist")
    }

    #[tokio::test]
    async fn test_message_for_open_conversation_is_appended_once() {
        let (_api, session) = session_with_bob().await;
        let reconciler = session.reconciler();
        let incoming = message("m-1", "c-1", "u-bob", "hey");

        reconciler.on_message_received(incoming.clone()).await;
        reconciler.on_message_received(incoming.clone()).await;

        assert_eq!(session.snapshot().active.unwrap().messages(), &[incoming]);
    }

    #[tokio::test]
    async fn test_message_for_other_conversation_marks_unread() {
        let (_api, session) = session_with_bob().await;
        session.select_conversation("carol@x.com").await.unwrap();
        let reconciler = session.reconciler();

        // c-1 is bob's conversation, c-2 is open
        reconciler
            .on_message_received(message("m-1", "c-1", "u-bob", "ping"))
            .await;

        let snapshot = session.snapshot();
        assert!(snapshot.active.as_ref().unwrap().messages().is_empty());
        let bob = summary(&snapshot.conversations, "c-1");
        assert_eq!(bob.preview(), "ping");
        assert!(bob.unread);
        assert!(!summary(&snapshot.conversations, "c-2").unread);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_triggers_list_refresh() {
        let (api, session) = session_with_bob().await;
        let calls = api.list_calls().await;

        session
            .reconciler()
            .on_message_received(message("m-1", "c-1", "u-bob", "hey"))
            .await;
        sleep(Duration::from_millis(1)).await;

        assert_eq!(api.list_calls().await, calls + 1);
    }

    #[tokio::test]
    async fn test_typing_from_counterpart_only() {
        let (_api, session) = session_with_bob().await;
        let reconciler = session.reconciler();

        reconciler.on_typing_changed(true, "carol@x.com").await;
        assert!(!session.snapshot().counterpart_typing);

        reconciler.on_typing_changed(true, "Bob@X.com").await;
        assert!(session.snapshot().counterpart_typing);

        reconciler.on_typing_changed(false, "bob@x.com").await;
        assert!(!session.snapshot().counterpart_typing);
    }

    #[tokio::test]
    async fn test_typing_ignored_without_open_conversation() {
        let (_api, session) = session_with_bob().await;
        session.close_conversation().await;

        session
            .reconciler()
            .on_typing_changed(true, "bob@x.com")
            .await;
        assert!(!session.snapshot().counterpart_typing);
    }

    #[tokio::test]
    async fn test_out_of_order_typing_last_arrival_wins() {
        let (_api, session) = session_with_bob().await;
        let reconciler = session.reconciler();

        reconciler.on_typing_changed(false, "bob@x.com").await;
        reconciler.on_typing_changed(true, "bob@x.com").await;
        assert!(session.snapshot().counterpart_typing);
    }

    #[tokio::test]
    async fn test_incoming_message_clears_typing() {
        let (_api, session) = session_with_bob().await;
        let reconciler = session.reconciler();

        reconciler.on_typing_changed(true, "bob@x.com").await;
        reconciler
            .on_message_received(message("m-1", "c-1", "u-bob", "done typing"))
            .await;
        assert!(!session.snapshot().counterpart_typing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_typing_expires() {
        let (_api, session) = session_with_bob().await;
        let reconciler = session.reconciler();

        reconciler.on_typing_changed(true, "bob@x.com").await;
        sleep(Duration::from_millis(3000)).await;
        // A refresh re-arms the expiry
        reconciler.on_typing_changed(true, "bob@x.com").await;

        sleep(Duration::from_millis(4000)).await;
        assert!(session.snapshot().counterpart_typing);

        sleep(Duration::from_millis(1100)).await;
        assert!(!session.snapshot().counterpart_typing);
    }

    #[tokio::test]
    async fn test_switching_conversation_clears_typing() {
        let (_api, session) = session_with_bob().await;
        session
            .reconciler()
            .on_typing_changed(true, "bob@x.com")
            .await;

        session.select_conversation("carol@x.com").await.unwrap();
        assert!(!session.snapshot().counterpart_typing);
    }

    #[tokio::test]
    async fn test_dispatch_routes_events() {
        let (_api, session) = session_with_bob().await;
        let reconciler = session.reconciler();

        reconciler
            .dispatch(InboundEvent::TypingChanged {
                is_typing: true,
                sender_email: "bob@x.com".to_string(),
            })
            .await;
        assert!(session.snapshot().counterpart_typing);

        reconciler
            .dispatch(InboundEvent::MessageReceived(message(
                "m-1", "c-1", "u-bob", "hi",
            )))
            .await;
        let snapshot = session.snapshot();
        assert_eq!(snapshot.active.unwrap().messages().len(), 1);
        assert!(!snapshot.counterpart_typing);
    }
}
