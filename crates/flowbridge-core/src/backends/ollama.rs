//! Ollama model-pull backend

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{OpenedUpstream, PullBackend};
use crate::error::BridgeError;
use crate::upstream::{HttpConnector, RequestDescriptor};

/// Default Ollama server URL
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Streams `POST /api/pull` progress from an Ollama runtime
pub struct OllamaBackend {
    connector: HttpConnector,
}

impl OllamaBackend {
    pub fn new(connector: HttpConnector) -> Self {
        Self { connector }
    }

    pub fn pull_descriptor(model: &str, base_url: &str) -> RequestDescriptor {
        RequestDescriptor::post(
            format!("{}/api/pull", base_url.trim_end_matches('/')),
            json!({ "name": model, "stream": true }),
        )
    }
}

#[async_trait]
impl PullBackend for OllamaBackend {
    async fn open_pull(&self, model: &str, base_url: &str) -> Result<OpenedUpstream, BridgeError> {
        let descriptor = Self::pull_descriptor(model, base_url);
        let upstream = self.connector.open(&descriptor).await?;
        debug!("Ollama pull of {} started at {}", model, base_url);
        Ok(OpenedUpstream {
            descriptor,
            reader: Box::new(upstream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_descriptor() {
        let descriptor = OllamaBackend::pull_descriptor("llama3:latest", "http://ollama:11434/");
        assert_eq!(descriptor.endpoint, "http://ollama:11434/api/pull");
        assert_eq!(descriptor.method, reqwest::Method::POST);
        assert_eq!(
            descriptor.body,
            Some(json!({ "name": "llama3:latest", "stream": true }))
        );
    }
}
