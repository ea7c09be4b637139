//! Bridge configuration.
//!
//! Defaults match a local projection endpoint. Hosts that keep editor
//! settings as JSON can load the same struct with [`BridgeConfig::from_json`];
//! every field is optional there.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::{CONTENT_ADDRESS, SCROLL_ADDRESS};

/// Username broadcast when none is configured.
pub const ANONYMOUS: &str = "anonymous";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid bridge settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// WebSocket URL of the projection endpoint
    pub endpoint_url: String,
    /// Name attached to every payload
    pub username: String,
    /// Routing address for content and caret payloads
    pub content_address: String,
    /// Routing address for scroll payloads
    pub scroll_address: String,
    /// Delay between a text change and its broadcast
    pub content_debounce_ms: u64,
    /// Delay before hooking the rendered view after attach
    pub mount_delay_ms: u64,
    /// Delay between a lost connection and the next attempt
    pub reconnect_delay_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "ws://localhost:3335".to_string(),
            username: ANONYMOUS.to_string(),
            content_address: CONTENT_ADDRESS.to_string(),
            scroll_address: SCROLL_ADDRESS.to_string(),
            content_debounce_ms: 20,
            mount_delay_ms: 200,
            reconnect_delay_ms: 1000,
        }
    }
}

impl BridgeConfig {
    /// Load from a JSON settings object. Missing fields keep their defaults.
    pub fn from_json(settings: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = serde_json::from_str(settings)?;
        let username = config.username.clone();
        Ok(config.with_username(username))
    }

    /// Set the broadcast username; an empty name falls back to [`ANONYMOUS`].
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.username = if username.is_empty() {
            ANONYMOUS.to_string()
        } else {
            username
        };
        self
    }

    pub fn with_endpoint(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = endpoint_url.into();
        self
    }

    pub fn content_debounce(&self) -> Duration {
        Duration::from_millis(self.content_debounce_ms)
    }

    pub fn mount_delay(&self) -> Duration {
        Duration::from_millis(self.mount_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.endpoint_url, "ws://localhost:3335");
        assert_eq!(config.username, "anonymous");
        assert_eq!(config.content_address, "/flok");
        assert_eq!(config.scroll_address, "/flok/scrollChange");
        assert_eq!(config.content_debounce(), Duration::from_millis(20));
        assert_eq!(config.mount_delay(), Duration::from_millis(200));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            BridgeConfig::from_json(r#"{"username": "alice", "endpointUrl": "ws://10.0.0.2:3335"}"#)
                .unwrap();
        assert_eq!(config.username, "alice");
        assert_eq!(config.endpoint_url, "ws://10.0.0.2:3335");
        assert_eq!(config.content_debounce_ms, 20);
    }

    #[test]
    fn test_empty_username_is_anonymous() {
        let config = BridgeConfig::from_json(r#"{"username": ""}"#).unwrap();
        assert_eq!(config.username, ANONYMOUS);

        let config = BridgeConfig::default().with_username("");
        assert_eq!(config.username, ANONYMOUS);
    }

    #[test]
    fn test_whitespace_username_is_kept() {
        let config = BridgeConfig::from_json(r#"{"username": "  "}"#).unwrap();
        assert_eq!(config.username, "  ");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let config = BridgeConfig::from_json(r#"{"theme": "dracula", "vimMode": true}"#).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_invalid_json() {
        let err = BridgeConfig::from_json("{not json").unwrap_err();
        assert!(err.to_string().starts_with("invalid bridge settings"));
    }
}
