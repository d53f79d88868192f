//! Real-time Event Envelope
//!
//! Events exchanged with the real-time service are JSON text frames:
//!
//! ```json
//! { "event": "userTyping", "data": { "isTyping": true, "senderEmail": "bob@x.com" } }
//! ```
//!
//! ## Event Names
//!
//! - Outgoing: `register`, `sendMessage`, `typing`
//! - Incoming: `receiveMessage`, `userTyping`
//!
//! Unknown incoming events are ignored so the server can add events without
//! breaking older clients.

use crate::model::Message;
use crate::{ChatError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const EVENT_REGISTER: &str = "register";
pub const EVENT_SEND_MESSAGE: &str = "sendMessage";
pub const EVENT_TYPING: &str = "typing";
pub const EVENT_RECEIVE_MESSAGE: &str = "receiveMessage";
pub const EVENT_USER_TYPING: &str = "userTyping";

/// A named event with its JSON payload
///
/// # Examples
///
/// ```
/// use chatline_session::event::Envelope;
/// use serde_json::json;
///
/// let envelope = Envelope::new("register", json!("u-alice"));
/// let text = envelope.to_text().unwrap();
///
/// let parsed = Envelope::from_text(&text).unwrap();
/// assert_eq!(parsed.event, "register");
/// assert_eq!(parsed.data, json!("u-alice"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name
    pub event: String,

    /// Event payload
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Serialize to a text frame
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a text frame
    ///
    /// Trailing whitespace and newlines are accepted.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::Transport` if the frame is not a valid envelope.
    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text.trim_end())
            .map_err(|e| ChatError::transport(format!("Malformed event frame: {}", e)))
    }

    pub fn is(&self, event: &str) -> bool {
        self.event == event
    }
}

/// Events this client sends
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Bind this connection to a user identity
    Register { user_id: String },

    /// Relay a confirmed message to its receiver
    SendMessage {
        receiver_id: String,
        message: Message,
    },

    /// Local user started or stopped typing
    Typing {
        receiver_id: String,
        is_typing: bool,
        sender_email: String,
    },
}

impl OutboundEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Register { .. } => EVENT_REGISTER,
            OutboundEvent::SendMessage { .. } => EVENT_SEND_MESSAGE,
            OutboundEvent::Typing { .. } => EVENT_TYPING,
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope> {
        let data = match self {
            OutboundEvent::Register { user_id } => json!(user_id),
            OutboundEvent::SendMessage {
                receiver_id,
                message,
            } => json!({
                "receiverId": receiver_id,
                "message": serde_json::to_value(message)?,
            }),
            OutboundEvent::Typing {
                receiver_id,
                is_typing,
                sender_email,
            } => json!({
                "receiverId": receiver_id,
                "isTyping": is_typing,
                "senderEmail": sender_email,
            }),
        };
        Ok(Envelope::new(self.name(), data))
    }
}

/// Events delivered by the real-time service
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A message was posted to one of the user's conversations
    MessageReceived(Message),

    /// The sender of this event started or stopped typing
    TypingChanged {
        is_typing: bool,
        sender_email: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    #[serde(default)]
    is_typing: bool,
    sender_email: String,
}

impl InboundEvent {
    /// Decode an envelope into an inbound event
    ///
    /// Returns `Ok(None)` for events this client does not handle.
    ///
    /// `receiveMessage` is accepted both as a bare message and wrapped as
    /// `{ "message": ... }`, which is how the relay forwards `sendMessage`.
    pub fn from_envelope(envelope: Envelope) -> Result<Option<Self>> {
        if envelope.is(EVENT_RECEIVE_MESSAGE) {
            let data = match envelope.data {
                Value::Object(mut map) if map.contains_key("message") => {
                    map.remove("message").unwrap_or(Value::Null)
                }
                other => other,
            };
            let message: Message = serde_json::from_value(data)?;
            Ok(Some(InboundEvent::MessageReceived(message)))
        } else if envelope.is(EVENT_USER_TYPING) {
            let payload: TypingPayload = serde_json::from_value(envelope.data)?;
            Ok(Some(InboundEvent::TypingChanged {
                is_typing: payload.is_typing,
                sender_email: payload.sender_email,
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_message() -> Message {
        Message {
            id: "m-1".to_string(),
            sender: "u-alice".to_string(),
            receiver: "u-bob".to_string(),
            content: "hi".to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap(),
            conversation_id: "c-1".to_string(),
        }
    }

    #[test]
    fn test_outbound_typing_payload() {
        let event = OutboundEvent::Typing {
            receiver_id: "u-bob".to_string(),
            is_typing: true,
            sender_email: "alice@x.com".to_string(),
        };
        let envelope = event.to_envelope().unwrap();
        assert_eq!(envelope.event, "typing");
        assert_eq!(envelope.data["receiverId"], "u-bob");
        assert_eq!(envelope.data["isTyping"], true);
        assert_eq!(envelope.data["senderEmail"], "alice@x.com");
    }

    #[test]
    fn test_outbound_send_message_carries_conversation_id() {
        let event = OutboundEvent::SendMessage {
            receiver_id: "u-bob".to_string(),
            message: sample_message(),
        };
        let envelope = event.to_envelope().unwrap();
        assert_eq!(envelope.event, "sendMessage");
        assert_eq!(envelope.data["message"]["conversationId"], "c-1");
    }

    #[test]
    fn test_receive_message_bare_and_wrapped() {
        let message = serde_json::to_value(sample_message()).unwrap();

        let bare = Envelope::new(EVENT_RECEIVE_MESSAGE, message.clone());
        let wrapped = Envelope::new(
            EVENT_RECEIVE_MESSAGE,
            json!({ "receiverId": "u-bob", "message": message }),
        );

        for envelope in [bare, wrapped] {
            match InboundEvent::from_envelope(envelope).unwrap() {
                Some(InboundEvent::MessageReceived(m)) => assert_eq!(m, sample_message()),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_user_typing_decoding() {
        let envelope = Envelope::from_text(
            r#"{"event":"userTyping","data":{"isTyping":false,"senderEmail":"bob@x.com"}}"#,
        )
        .unwrap();
        assert_eq!(
            InboundEvent::from_envelope(envelope).unwrap(),
            Some(InboundEvent::TypingChanged {
                is_typing: false,
                sender_email: "bob@x.com".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let envelope = Envelope::new("presence", json!({ "online": true }));
        assert_eq!(InboundEvent::from_envelope(envelope).unwrap(), None);
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(
            Envelope::from_text("not json"),
            Err(ChatError::Transport(_))
        ));

        let envelope = Envelope::new(EVENT_RECEIVE_MESSAGE, json!({ "id": 5 }));
        assert!(matches!(
            InboundEvent::from_envelope(envelope),
            Err(ChatError::Json(_))
        ));
    }
}
