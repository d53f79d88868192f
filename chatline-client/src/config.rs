//! Client Configuration
//!
//! Stored as TOML in `<config dir>/chatline/client.toml`:
//!
//! ```toml
//! [server]
//! api_url = "http://localhost:5000/api"
//! socket_url = "ws://localhost:5000"
//! request_timeout_secs = 15
//!
//! [account]
//! user_id = "65f1c0..."
//! email = "alice@example.com"
//!
//! [session]
//! typing_quiet_period_ms = 3000
//! ```

use anyhow::{bail, Context, Result};
use chatline_session::{HttpConversationApiConfig, SessionConfig, WsTransportConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Real-time service URL
    #[serde(default = "default_socket_url")]
    pub socket_url: String,

    /// Bearer token for the REST API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Identity of the signed-in user
///
/// Obtained from the chat server's login flow, which this client does not
/// implement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default)]
    pub user_id: String,

    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

fn default_api_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_socket_url() -> String {
    "ws://localhost:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            socket_url: default_socket_url(),
            auth_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn api_config(&self) -> HttpConversationApiConfig {
        HttpConversationApiConfig {
            auth_token: self.auth_token.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..HttpConversationApiConfig::new(self.api_url.clone())
        }
    }

    pub fn socket_config(&self, session: &SessionConfig) -> WsTransportConfig {
        WsTransportConfig {
            event_buffer: session.event_buffer,
            ..WsTransportConfig::new(self.socket_url.clone())
        }
    }
}

impl ClientConfig {
    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("chatline")
            .join(CONFIG_FILE)
    }

    /// Load configuration from `path`, creating a default file if missing
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: ClientConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;
            Ok(config)
        } else {
            let config = ClientConfig::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Check that an account is configured
    pub fn validate(&self) -> Result<()> {
        if self.account.user_id.trim().is_empty() || self.account.email.trim().is_empty() {
            bail!("No account configured: set [account] user_id and email in the config file");
        }
        if self.session.typing_quiet_period_ms == 0 {
            bail!("[session] typing_quiet_period_ms must be greater than zero");
        }
        Ok(())
    }
}
