//! Letta agent server backend

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{ChatBackend, OpenedUpstream};
use crate::bridge::AgentRequest;
use crate::error::BridgeError;
use crate::upstream::{HttpConnector, RequestDescriptor};

/// Streams agent replies from a Letta server
pub struct LettaBackend {
    connector: HttpConnector,
    base_url: String,
    /// Limit for the synchronous call
    timeout: Duration,
}

impl LettaBackend {
    pub fn new(connector: HttpConnector, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            connector,
            base_url,
            timeout,
        }
    }

    fn messages_body(request: &AgentRequest) -> Vec<Value> {
        request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect()
    }

    pub fn stream_descriptor(&self, request: &AgentRequest) -> RequestDescriptor {
        RequestDescriptor::post(
            format!(
                "{}/v1/agents/{}/messages/stream",
                self.base_url, request.agent_id
            ),
            json!({
                "messages": Self::messages_body(request),
                "stream_tokens": true,
            }),
        )
    }

    pub fn generate_descriptor(&self, request: &AgentRequest) -> RequestDescriptor {
        RequestDescriptor::post(
            format!("{}/v1/agents/{}/messages", self.base_url, request.agent_id),
            json!({ "messages": Self::messages_body(request) }),
        )
    }
}

#[async_trait]
impl ChatBackend for LettaBackend {
    async fn open_stream(&self, request: &AgentRequest) -> Result<OpenedUpstream, BridgeError> {
        let descriptor = self.stream_descriptor(request);
        let upstream = self.connector.open(&descriptor).await?;
        debug!(
            "Letta stream opened for agent {} (status {})",
            request.agent_id,
            upstream.status()
        );
        Ok(OpenedUpstream {
            descriptor,
            reader: Box::new(upstream),
        })
    }

    async fn generate(&self, request: &AgentRequest) -> Result<String, BridgeError> {
        let descriptor = self.generate_descriptor(request);
        let json = self
            .connector
            .call_json(&descriptor, Some(self.timeout))
            .await?;
        Ok(extract_assistant_text(&json))
    }
}

/// Concatenate the assistant messages of a Letta response
pub fn extract_assistant_text(json: &Value) -> String {
    let Some(messages) = json.get("messages").and_then(|m| m.as_array()) else {
        return String::new();
    };

    let mut text = String::new();
    for message in messages {
        if message.get("message_type").and_then(|t| t.as_str()) != Some("assistant_message") {
            continue;
        }
        match message.get("content") {
            Some(Value::String(content)) => text.push_str(content),
            Some(Value::Array(parts)) => {
                for part in parts {
                    if let Some(part_text) = part.get("text").and_then(|t| t.as_str()) {
                        text.push_str(part_text);
                    }
                }
            }
            _ => {}
        }
    }

    text.trim().to_string()
}
