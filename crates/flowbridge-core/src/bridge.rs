//! Bridge entry points for the two streaming call sites
//!
//! Validates requests before anything is streamed, opens the upstream, and
//! hands the HTTP layer a frame receiver backed by a running session.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::backends::{
    ChatBackend, ChatFallback, LettaBackend, OllamaBackend, OpenedUpstream, PullBackend,
};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::fallback::SyncCall;
use crate::pipeline::{EventPipeline, ProgressPipeline, TokenPipeline};
use crate::session::{SessionCancellation, SessionReport, StreamLifecycleManager};
use crate::sink::FrameSink;
use crate::upstream::HttpConnector;

/// Chat request body: `{ agentId, messages, debug? }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub messages: Option<Value>,
    #[serde(default)]
    pub debug: Option<Value>,
}

/// Pull request body: `{ model, baseUrl? }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

/// One conversation message as sent to the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A validated chat request
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub agent_id: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Only a literal `true` selects the debug path
    pub fn is_debug(&self) -> bool {
        matches!(self.debug, Some(Value::Bool(true)))
    }

    pub fn validate(&self) -> Result<AgentRequest, BridgeError> {
        let agent_id = self
            .agent_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BridgeError::Validation("agentId is required".to_string()))?;

        Ok(AgentRequest {
            agent_id: agent_id.to_string(),
            messages: convert_messages(self.messages.as_ref())?,
        })
    }
}

impl PullRequest {
    /// Read `model` and `baseUrl` from an arbitrary JSON body, ignoring
    /// fields that are missing or not strings
    pub fn from_value(body: &Value) -> Self {
        let field = |name: &str| body.get(name).and_then(Value::as_str).map(str::to_string);
        Self {
            model: field("model"),
            base_url: field("baseUrl"),
        }
    }

    /// The trimmed model name
    pub fn validate(&self) -> Result<&str, BridgeError> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| BridgeError::Validation("Missing required field: model".to_string()))
    }
}

/// Accepts `{role, content}` and UI-style `{role, parts: [{type: "text", text}]}`
fn convert_messages(messages: Option<&Value>) -> Result<Vec<ChatMessage>, BridgeError> {
    let items = match messages {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(BridgeError::InvalidMessages(
                "messages must be an array".to_string(),
            ))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| -> Result<ChatMessage, BridgeError> {
            let role = item
                .get("role")
                .and_then(|r| r.as_str())
                .ok_or_else(|| {
                    BridgeError::InvalidMessages(format!("message {} has no role", idx))
                })?;

            let content = match (item.get("content"), item.get("parts")) {
                (Some(Value::String(text)), _) => text.clone(),
                (_, Some(Value::Array(parts))) => parts
                    .iter()
                    .filter(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect::<Vec<_>>()
                    .join(""),
                (None | Some(Value::Null), None) => String::new(),
                _ => {
                    return Err(BridgeError::InvalidMessages(format!(
                        "message {} has unsupported content",
                        idx
                    )))
                }
            };

            Ok(ChatMessage {
                role: role.to_string(),
                content,
            })
        })
        .collect()
}

/// A running session as seen by the HTTP layer
pub struct BridgeStream {
    pub session_id: Uuid,
    /// Encoded SSE frames; ends when the session closes
    pub frames: mpsc::Receiver<Bytes>,
    pub cancellation: SessionCancellation,
    pub task: JoinHandle<SessionReport>,
}

/// Result of a chat request
pub enum ChatOutcome {
    Stream(BridgeStream),
    /// `{ok: true, debug: true, result}` from the non-streaming path
    Debug(Value),
}

/// Entry point shared by both streaming routes
pub struct StreamBridge {
    config: BridgeConfig,
    chat: Arc<dyn ChatBackend>,
    puller: Arc<dyn PullBackend>,
}

impl StreamBridge {
    pub fn new(
        config: BridgeConfig,
        chat: Arc<dyn ChatBackend>,
        puller: Arc<dyn PullBackend>,
    ) -> Self {
        Self {
            config,
            chat,
            puller,
        }
    }

    /// Bridge backed by the HTTP Letta and Ollama backends
    pub fn from_config(config: BridgeConfig) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder().build()?;

        let chat = LettaBackend::new(
            HttpConnector::new(client.clone()).with_api_key(config.chat.api_key.clone()),
            config.chat.base_url.clone(),
            config.fallback_timeout(),
        );
        let puller = OllamaBackend::new(HttpConnector::new(client));

        Ok(Self::new(config, Arc::new(chat), Arc::new(puller)))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Handle a chat request: debug call, or token stream with fallback
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatOutcome, BridgeError> {
        let agent = request.validate()?;

        if request.is_debug() {
            info!("Debug chat call for agent {}", agent.agent_id);
            let text = self
                .chat
                .generate(&agent)
                .await
                .map_err(|e| BridgeError::DebugCall(e.to_string()))?;
            return Ok(ChatOutcome::Debug(json!({
                "ok": true,
                "debug": true,
                "result": { "text": text },
            })));
        }

        let opened = self.chat.open_stream(&agent).await?;
        let fallback: Arc<dyn SyncCall> = Arc::new(ChatFallback::new(self.chat.clone(), agent));
        Ok(ChatOutcome::Stream(self.start_session(
            opened,
            Box::new(TokenPipeline::new()),
            Some(fallback),
        )))
    }

    /// Handle a model-pull request
    pub async fn pull(&self, request: PullRequest) -> Result<BridgeStream, BridgeError> {
        let model = request.validate()?;
        let base_url = self.config.resolve_ollama_url(request.base_url.as_deref());

        info!("Pulling model {} from {}", model, base_url);
        let opened = self.puller.open_pull(model, &base_url).await?;
        Ok(self.start_session(opened, Box::new(ProgressPipeline::new()), None))
    }

    fn start_session(
        &self,
        opened: OpenedUpstream,
        pipeline: Box<dyn EventPipeline>,
        fallback: Option<Arc<dyn SyncCall>>,
    ) -> BridgeStream {
        let (sink, frames) = FrameSink::channel(self.config.channel_capacity);
        let mut manager = StreamLifecycleManager::new(
            opened.descriptor,
            opened.reader,
            pipeline,
            sink,
            self.config.session_options(),
        );
        if let Some(call) = fallback {
            manager = manager.with_fallback(call);
        }

        let session_id = manager.id();
        let cancellation = manager.cancellation();
        let task = manager.spawn();

        BridgeStream {
            session_id,
            frames,
            cancellation,
            task,
        }
    }
}
