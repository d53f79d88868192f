//! Outbound Typing Debouncer
//!
//! Turns a stream of local keystroke notifications into at most one
//! "started typing" and one "stopped typing" signal per burst.
//!
//! ## State Machine
//!
//! ```text
//!            keystroke                      quiet period elapsed
//!   Idle ──────────────> Typing{target} ───────────────────────> Idle
//!    ^   emit(true)        │    ^         emit(false)
//!    │                     │    │ keystroke: re-arm timer
//!    │                     │    └──────────
//!    └─────────────────────┘
//!      send / cancel: emit(false)
//! ```
//!
//! Every keystroke cancels the pending timer and arms a new one. The timer
//! carries the generation it was armed for, so a timer that fires after it
//! was superseded does nothing.

use crate::event::OutboundEvent;
use crate::transport::RealtimeTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Outbound typing status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TypingPhase {
    /// No "started typing" signal is outstanding
    #[default]
    Idle,

    /// A "started typing" signal was sent to `receiver_id`
    Typing { receiver_id: String },
}

#[derive(Debug, Default)]
struct DebounceState {
    phase: TypingPhase,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl DebounceState {
    /// Invalidate the armed timer, if any
    fn disarm(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Debug)]
struct Inner {
    transport: Arc<dyn RealtimeTransport>,
    sender_email: String,
    quiet_period: Duration,
    state: Mutex<DebounceState>,
}

impl Inner {
    async fn signal(&self, receiver_id: &str, is_typing: bool) {
        let event = OutboundEvent::Typing {
            receiver_id: receiver_id.to_string(),
            is_typing,
            sender_email: self.sender_email.clone(),
        };
        if let Err(e) = self.transport.emit(event).await {
            warn!("Failed to send typing={} to {}: {}", is_typing, receiver_id, e);
        }
    }

    /// Quiet period elapsed for the timer armed at `generation`
    async fn expire(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!("Ignoring superseded typing timer");
            return;
        }
        state.timer = None;

        if let TypingPhase::Typing { receiver_id } = std::mem::take(&mut state.phase) {
            debug!("Typing quiet period elapsed for {}", receiver_id);
            self.signal(&receiver_id, false).await;
        }
    }

    /// Return to Idle, signalling a stop if one is outstanding
    async fn stop(&self, reason: &str) {
        let mut state = self.state.lock().await;
        state.disarm();

        if let TypingPhase::Typing { receiver_id } = std::mem::take(&mut state.phase) {
            debug!("Typing stopped for {} ({})", receiver_id, reason);
            self.signal(&receiver_id, false).await;
        }
    }
}

/// Debounces the local user's typing activity into start/stop signals
///
/// Cloning yields another handle to the same debouncer.
#[derive(Debug, Clone)]
pub struct TypingDebouncer {
    inner: Arc<Inner>,
}

impl TypingDebouncer {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        sender_email: impl Into<String>,
        quiet_period: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                sender_email: sender_email.into(),
                quiet_period,
                state: Mutex::new(DebounceState::default()),
            }),
        }
    }

    /// Record a keystroke aimed at `receiver_id`
    ///
    /// Sends "started typing" on the first keystroke of a burst and re-arms
    /// the quiet-period timer on every keystroke. If the target changed
    /// while typing, the old target gets "stopped typing" first.
    pub async fn notify_local_typing(&self, receiver_id: &str) {
        let mut state = self.inner.state.lock().await;

        match &state.phase {
            TypingPhase::Typing { receiver_id: current } if current == receiver_id => {}
            TypingPhase::Typing { receiver_id: current } => {
                let previous = current.clone();
                debug!("Typing target changed from {} to {}", previous, receiver_id);
                self.inner.signal(&previous, false).await;
                self.inner.signal(receiver_id, true).await;
            }
            TypingPhase::Idle => {
                self.inner.signal(receiver_id, true).await;
            }
        }

        state.phase = TypingPhase::Typing {
            receiver_id: receiver_id.to_string(),
        };
        state.disarm();

        let generation = state.generation;
        let inner = self.inner.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.quiet_period).await;
            inner.expire(generation).await;
        }));
    }

    /// A message was sent: stop typing immediately
    pub async fn notify_send(&self) {
        self.inner.stop("message sent").await;
    }

    /// Abandon the burst, e.g. when the conversation is switched or closed
    pub async fn cancel(&self) {
        self.inner.stop("cancelled").await;
    }

    pub async fn phase(&self) -> TypingPhase {
        self.inner.state.lock().await.phase.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use tokio::time::{sleep, Instant};

    const QUIET: Duration = Duration::from_millis(3000);

    fn setup() -> (Arc<MemoryTransport>, TypingDebouncer) {
        let transport = Arc::new(MemoryTransport::new());
        let debouncer = TypingDebouncer::new(transport.clone(), "alice@x.com", QUIET);
        (transport, debouncer)
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystroke_burst_is_coalesced() {
        let (transport, debouncer) = setup();
        let start = Instant::now();

        debouncer.notify_local_typing("u-bob").await;
        sleep(Duration::from_millis(500)).await;
        debouncer.notify_local_typing("u-bob").await;
        sleep(Duration::from_millis(500)).await;
        debouncer.notify_local_typing("u-bob").await;

        sleep(Duration::from_millis(2999)).await;
        assert_eq!(transport.typing_signals().await, vec![(start, true)]);

        sleep(Duration::from_millis(10)).await;
        assert_eq!(
            transport.typing_signals().await,
            vec![(start, true), (start + Duration::from_millis(4000), false)]
        );
        assert_eq!(debouncer.phase().await, TypingPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_stops_typing_immediately() {
        let (transport, debouncer) = setup();
        let start = Instant::now();

        debouncer.notify_local_typing("u-bob").await;
        sleep(Duration::from_millis(1000)).await;
        debouncer.notify_send().await;

        // The disarmed timer must not produce a second stop
        sleep(Duration::from_secs(10)).await;
        assert_eq!(
            transport.typing_signals().await,
            vec![(start, true), (start + Duration::from_millis(1000), false)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_while_idle_emits_nothing() {
        let (transport, debouncer) = setup();
        debouncer.notify_send().await;
        sleep(Duration::from_secs(5)).await;
        assert!(transport.typing_signals().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_burst_after_stop() {
        let (transport, debouncer) = setup();

        debouncer.notify_local_typing("u-bob").await;
        sleep(Duration::from_secs(4)).await;
        debouncer.notify_local_typing("u-bob").await;
        sleep(Duration::from_secs(4)).await;

        let signals: Vec<bool> = transport
            .typing_signals()
            .await
            .into_iter()
            .map(|(_, typing)| typing)
            .collect();
        assert_eq!(signals, vec![true, false, true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_change_stops_previous_target() {
        let (transport, debouncer) = setup();

        debouncer.notify_local_typing("u-bob").await;
        debouncer.notify_local_typing("u-carol").await;

        let emitted = transport.emitted().await;
        assert_eq!(
            emitted,
            vec![
                OutboundEvent::Typing {
                    receiver_id: "u-bob".to_string(),
                    is_typing: true,
                    sender_email: "alice@x.com".to_string(),
                },
                OutboundEvent::Typing {
                    receiver_id: "u-bob".to_string(),
                    is_typing: false,
                    sender_email: "alice@x.com".to_string(),
                },
                OutboundEvent::Typing {
                    receiver_id: "u-carol".to_string(),
                    is_typing: true,
                    sender_email: "alice@x.com".to_string(),
                },
            ]
        );
        assert_eq!(
            debouncer.phase().await,
            TypingPhase::Typing {
                receiver_id: "u-carol".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_emit_failure_still_returns_to_idle() {
        let (transport, debouncer) = setup();
        transport.set_fail_emits(true);

        debouncer.notify_local_typing("u-bob").await;
        debouncer.cancel().await;

        assert_eq!(debouncer.phase().await, TypingPhase::Idle);
        assert!(transport.typing_signals().await.is_empty());
    }
}
