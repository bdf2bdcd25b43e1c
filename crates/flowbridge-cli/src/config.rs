//! Config file loading
//!
//! TOML from an explicit path or the user config dir, then env overrides.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use flowbridge_core::BridgeConfig;

/// `<config dir>/flowbridge/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("flowbridge").join("config.toml"))
}

/// Load the config, applying environment overrides last
pub fn load(explicit: Option<&Path>) -> Result<BridgeConfig> {
    load_with(explicit, |key| std::env::var(key).ok())
}

fn load_with(
    explicit: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BridgeConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };

    let config = match path {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            parse(&content).with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => BridgeConfig::default(),
    };

    Ok(config.with_overrides(lookup))
}

pub fn parse(content: &str) -> Result<BridgeConfig> {
    toml::from_str(content).context("Invalid TOML")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config = parse(
            r#"
            heartbeat_interval_ms = 5000

            [chat]
            base_url = "http://letta:8283"
            api_key = "secret"

            [ollama]
            base_url = "http://ollama:11434"
            "#,
        )
        .unwrap();

        assert_eq!(config.heartbeat_interval_ms, 5000);
        assert_eq!(config.chat.base_url, "http://letta:8283");
        assert_eq!(config.chat.api_key.as_deref(), Some("secret"));
        assert_eq!(config.chat.fallback_timeout_secs, 120);
        assert_eq!(config.ollama.base_url.as_deref(), Some("http://ollama:11434"));
    }

    #[test]
    fn test_load_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "channel_capacity = 8\n[chat]\nbase_url = \"http://file:8283\"\n").unwrap();

        let config = load_with(Some(&path), |key| {
            (key == "LETTA_BASE_URL").then(|| "http://env:8283".to_string())
        })
        .unwrap();
        assert_eq!(config.channel_capacity, 8);
        assert_eq!(config.chat.base_url, "http://env:8283");
    }

    #[test]
    fn test_ollama_url_env_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ollama]\nbase_url = \"http://file:11434\"\n").unwrap();

        let from_file = load_with(Some(&path), |_| None).unwrap();
        assert_eq!(from_file.resolve_ollama_url(None), "http://file:11434");

        let from_env = load_with(Some(&path), |key| {
            (key == "OLLAMA_BASE_URL").then(|| "http://env:11434".to_string())
        })
        .unwrap();
        assert_eq!(from_env.resolve_ollama_url(None), "http://env:11434");
        assert_eq!(
            from_env.resolve_ollama_url(Some("http://request:11434")),
            "http://request:11434"
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_with(Some(&dir.path().join("nope.toml")), |_| None).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(parse("heartbeat_interval_ms = \"soon\"").is_err());
    }
}
