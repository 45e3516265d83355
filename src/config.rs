//! Client configuration.
//!
//! ```toml
//! url = "ircs://irc.libera.chat:6697"
//! nick = "alice"
//! ping_interval_secs = 60
//!
//! [sasl]
//! mechanism = "plain"
//! username = "alice"
//! password = "hunter2"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::sasl::SaslCredentials;

/// Errors loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

fn default_true() -> bool {
    true
}

fn default_history_page_size() -> usize {
    100
}

fn default_history_budget() -> usize {
    1000
}

fn default_reconnect_min_secs() -> u64 {
    10
}

fn default_reconnect_max_secs() -> u64 {
    600
}

/// Everything needed to connect and register.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint: `irc://`, `ircs://`, `ws://` or `wss://`.
    pub url: String,
    /// Server password sent with `PASS`.
    #[serde(default)]
    pub password: Option<String>,
    /// Desired nickname.
    pub nick: String,
    /// Username (ident); defaults to the nickname.
    #[serde(default)]
    pub username: Option<String>,
    /// Real name; defaults to the nickname.
    #[serde(default)]
    pub realname: Option<String>,
    /// SASL credentials, at most one mechanism.
    #[serde(default)]
    pub sasl: Option<SaslCredentials>,
    /// Request `draft/event-playback`.
    #[serde(default)]
    pub event_playback: bool,
    /// soju bouncer network to bind before registration.
    #[serde(default)]
    pub bouncer_network: Option<String>,
    /// Client-side PING interval; `0` disables keep-alive.
    #[serde(default)]
    pub ping_interval_secs: u64,
    /// Upper bound for one CHATHISTORY page.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
    /// Maximum number of messages a forward history fetch may collect.
    #[serde(default = "default_history_budget")]
    pub history_budget: usize,
    /// Reconnect after the connection drops.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// First reconnect delay.
    #[serde(default = "default_reconnect_min_secs")]
    pub reconnect_min_secs: u64,
    /// Reconnect delay ceiling.
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
}

impl ClientConfig {
    /// A configuration with defaults for everything but the endpoint and
    /// nickname.
    pub fn new(url: impl Into<String>, nick: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: None,
            nick: nick.into(),
            username: None,
            realname: None,
            sasl: None,
            event_playback: false,
            bouncer_network: None,
            ping_interval_secs: 0,
            history_page_size: default_history_page_size(),
            history_budget: default_history_budget(),
            auto_reconnect: true,
            reconnect_min_secs: default_reconnect_min_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Username, falling back to the nickname.
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nick)
    }

    /// Real name, falling back to the nickname.
    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nick)
    }

    /// Keep-alive interval, if enabled.
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }

    /// First reconnect delay.
    pub fn reconnect_min(&self) -> Duration {
        Duration::from_secs(self.reconnect_min_secs)
    }

    /// Reconnect delay ceiling.
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_secs)
    }
}
