//! Upstream backends
//!
//! A chat backend streams agent tokens and can answer the same request
//! synchronously; a pull backend streams model download progress.

mod letta;
mod ollama;

pub use letta::LettaBackend;
pub use ollama::{OllamaBackend, DEFAULT_OLLAMA_URL};

use async_trait::async_trait;
use std::sync::Arc;

use crate::bridge::AgentRequest;
use crate::error::BridgeError;
use crate::fallback::SyncCall;
use crate::upstream::{RequestDescriptor, UpstreamReader};

/// An upstream that answered with a success status
pub struct OpenedUpstream {
    pub descriptor: RequestDescriptor,
    pub reader: Box<dyn UpstreamReader>,
}

/// Agent chat backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Open the token stream for `request`
    async fn open_stream(&self, request: &AgentRequest) -> Result<OpenedUpstream, BridgeError>;

    /// Answer `request` without streaming, returning the assistant text
    async fn generate(&self, request: &AgentRequest) -> Result<String, BridgeError>;
}

/// Model-pull backend
#[async_trait]
pub trait PullBackend: Send + Sync {
    /// Open the progress feed for pulling `model` from the runtime at `base_url`
    async fn open_pull(&self, model: &str, base_url: &str) -> Result<OpenedUpstream, BridgeError>;
}

/// Synchronous replay of a chat request, used when its stream stays silent
pub struct ChatFallback {
    backend: Arc<dyn ChatBackend>,
    request: AgentRequest,
}

impl ChatFallback {
    pub fn new(backend: Arc<dyn ChatBackend>, request: AgentRequest) -> Self {
        Self { backend, request }
    }
}

#[async_trait]
impl SyncCall for ChatFallback {
    async fn call(&self) -> Result<String, BridgeError> {
        self.backend.generate(&self.request).await
    }
}
