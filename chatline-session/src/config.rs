//! Session Configuration
//!
//! Timing and buffering knobs for a chat session.
//!
//! ```toml
//! [session]
//! typing_quiet_period_ms = 3000   # silence before "stopped typing" is sent
//! remote_typing_timeout_ms = 5000 # counterpart indicator expiry
//! event_buffer = 256              # inbound event queue capacity
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quiet period after the last keystroke before "typing=false" is sent
pub const DEFAULT_TYPING_QUIET_PERIOD_MS: u64 = 3000;

/// Counterpart typing indicator lifetime without a refresh
pub const DEFAULT_REMOTE_TYPING_TIMEOUT_MS: u64 = 5000;

pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Chat session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Outbound typing debounce window in milliseconds
    #[serde(default = "default_typing_quiet_period_ms")]
    pub typing_quiet_period_ms: u64,

    /// Inbound typing indicator expiry in milliseconds
    #[serde(default = "default_remote_typing_timeout_ms")]
    pub remote_typing_timeout_ms: u64,

    /// Capacity of the inbound event queue
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl SessionConfig {
    pub fn typing_quiet_period(&self) -> Duration {
        Duration::from_millis(self.typing_quiet_period_ms)
    }

    pub fn remote_typing_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_typing_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            typing_quiet_period_ms: DEFAULT_TYPING_QUIET_PERIOD_MS,
            remote_typing_timeout_ms: DEFAULT_REMOTE_TYPING_TIMEOUT_MS,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

fn default_typing_quiet_period_ms() -> u64 {
    DEFAULT_TYPING_QUIET_PERIOD_MS
}

fn default_remote_typing_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TYPING_TIMEOUT_MS
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.typing_quiet_period(), Duration::from_secs(3));
        assert_eq!(config.remote_typing_timeout(), Duration::from_secs(5));
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_partial_deserialization() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "typing_quiet_period_ms": 1500 }"#).unwrap();
        assert_eq!(config.typing_quiet_period(), Duration::from_millis(1500));
        assert_eq!(
            config.remote_typing_timeout_ms,
            DEFAULT_REMOTE_TYPING_TIMEOUT_MS
        );
    }
}
