//! Silent-stream fallback
//!
//! Some backends close a token stream without emitting anything. When that
//! happens the same request is replayed synchronously and its result sent as
//! one terminal frame, so the client always gets a substantive answer.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::BridgeError;
use crate::normalize::{NormalizedEvent, Payload};

/// Fallback progress for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackState {
    /// Upstream still streaming
    Streaming,
    /// Upstream ended silently, synchronous call in flight
    FallbackPending,
    /// Nothing left to do
    Done,
}

/// One synchronous (non-streaming) call for the session's logical request
#[async_trait]
pub trait SyncCall: Send + Sync {
    async fn call(&self) -> Result<String, BridgeError>;
}

/// Wire shape of the synthesized frame. An empty answer is sent as
/// `"text": null`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum FallbackFrame<'a> {
    Answer {
        fallback: bool,
        text: Option<&'a str>,
    },
    Failed {
        fallback: bool,
        error: &'a str,
    },
}

/// Decides whether a fallback frame is needed and produces it
#[derive(Debug)]
pub struct FallbackController {
    state: FallbackState,
}

impl Default for FallbackController {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackController {
    pub fn new() -> Self {
        Self {
            state: FallbackState::Streaming,
        }
    }

    pub fn state(&self) -> FallbackState {
        self.state
    }

    /// Called once the upstream has ended.
    ///
    /// Returns the single fallback frame when no data was seen. Only the first
    /// call can produce a frame.
    pub async fn on_upstream_end(
        &mut self,
        saw_data: bool,
        call: &dyn SyncCall,
    ) -> Option<NormalizedEvent> {
        if self.state != FallbackState::Streaming {
            return None;
        }

        if saw_data {
            self.state = FallbackState::Done;
            return None;
        }

        self.state = FallbackState::FallbackPending;
        warn!("Stream ended without emitting data, attempting synchronous fallback");

        let frame = match call.call().await {
            Ok(text) => {
                info!("Fallback call returned {} chars", text.len());
                FallbackFrame::Answer {
                    fallback: true,
                    text: Some(text.as_str()).filter(|t| !t.is_empty()),
                }
                .to_event()
            }
            Err(e) => {
                let message = match e {
                    BridgeError::Fallback(message) => message,
                    other => other.to_string(),
                };
                warn!("Fallback call failed: {}", message);
                FallbackFrame::Failed {
                    fallback: true,
                    error: &message,
                }
                .to_event()
            }
        };

        self.state = FallbackState::Done;
        Some(frame)
    }
}

impl FallbackFrame<'_> {
    fn to_event(&self) -> NormalizedEvent {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|_| "{\"fallback\":true,\"error\":\"serialization failed\"}".to_string());
        NormalizedEvent::Data {
            payload: Payload::Raw(json),
        }
    }
}
