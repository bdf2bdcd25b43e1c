//! Bridge configuration
//!
//! Deserializable from TOML (every field optional) and overridable from the
//! environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backends::DEFAULT_OLLAMA_URL;
use crate::heartbeat::{HeartbeatScheduler, HEARTBEAT_INTERVAL};
use crate::session::SessionOptions;

/// Default Letta server URL
pub const DEFAULT_LETTA_URL: &str = "http://localhost:8283";

/// Configuration for the streaming bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Keep-alive period in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Frames buffered per client before upstream reads pause
    pub channel_capacity: usize,
    /// Write `: connected` as soon as a session opens
    pub announce_connection: bool,
    pub chat: ChatConfig,
    pub ollama: OllamaConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: HEARTBEAT_INTERVAL.as_millis() as u64,
            channel_capacity: 64,
            announce_connection: true,
            chat: ChatConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// Agent server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Limit for synchronous (fallback and debug) calls
    pub fallback_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LETTA_URL.to_string(),
            api_key: None,
            fallback_timeout_secs: 120,
        }
    }
}

/// Model runtime settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Used when a pull request carries no `baseUrl`
    pub base_url: Option<String>,
}

impl BridgeConfig {
    /// Defaults overlaid with environment variables
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlay `FLOWBRIDGE_HEARTBEAT_MS`, `LETTA_BASE_URL`, `LETTA_API_KEY`
    /// and `OLLAMA_BASE_URL` when set
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(ms) = lookup("FLOWBRIDGE_HEARTBEAT_MS").and_then(|v| v.trim().parse().ok()) {
            self.heartbeat_interval_ms = ms;
        }
        if let Some(url) = lookup("LETTA_BASE_URL") {
            self.chat.base_url = url;
        }
        if let Some(key) = lookup("LETTA_API_KEY") {
            self.chat.api_key = Some(key);
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.ollama.base_url = Some(url);
        }
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.chat.fallback_timeout_secs)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            heartbeat: HeartbeatScheduler::new(self.heartbeat_interval()),
            announce_connection: self.announce_connection,
        }
    }

    /// Pick the Ollama URL for a pull: request value, then config, then default
    pub fn resolve_ollama_url(&self, requested: Option<&str>) -> String {
        let url = requested
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .or_else(|| {
                self.ollama
                    .base_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
            })
            .unwrap_or(DEFAULT_OLLAMA_URL);
        url.trim_end_matches('/').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_millis(15_000));
        assert_eq!(config.chat.base_url, DEFAULT_LETTA_URL);
        assert!(config.announce_connection);
        assert_eq!(config.fallback_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FLOWBRIDGE_HEARTBEAT_MS", "5000"),
            ("LETTA_BASE_URL", "http://letta:8283"),
            ("LETTA_API_KEY", "  "),
            ("OLLAMA_BASE_URL", "http://ollama:11434"),
        ]
        .into_iter()
        .collect();

        let config =
            BridgeConfig::default().with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.heartbeat_interval_ms, 5000);
        assert_eq!(config.chat.base_url, "http://letta:8283");
        assert_eq!(config.chat.api_key, None);
        assert_eq!(config.ollama.base_url.as_deref(), Some("http://ollama:11434"));
    }

    #[test]
    fn test_resolve_ollama_url() {
        let mut config = BridgeConfig::default();
        assert_eq!(config.resolve_ollama_url(None), DEFAULT_OLLAMA_URL);
        assert_eq!(config.resolve_ollama_url(Some("   ")), DEFAULT_OLLAMA_URL);

        config.ollama.base_url = Some("http://ollama:11434/".into());
        assert_eq!(config.resolve_ollama_url(None), "http://ollama:11434");
        assert_eq!(
            config.resolve_ollama_url(Some(" http://gpu-box:11434 ")),
            "http://gpu-box:11434"
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: BridgeConfig = serde_json::from_str(r#"{"chat":{"api_key":"k"}}"#).unwrap();
        assert_eq!(config.chat.api_key.as_deref(), Some("k"));
        assert_eq!(config.chat.base_url, DEFAULT_LETTA_URL);
        assert_eq!(config.channel_capacity, 64);
    }
}
