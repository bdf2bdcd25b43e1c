//! Upstream connections
//!
//! Opens a request against an external producer and exposes its body as a
//! pull-based sequence of raw chunks.

mod http;

pub use http::{HttpConnector, HttpUpstream};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde_json::Value;

use crate::error::BridgeError;

/// What to send upstream for one session
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Full URL of the producer endpoint
    pub endpoint: String,
    pub method: Method,
    /// JSON body, if any
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// POST descriptor with a JSON body
    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::POST,
            body: Some(body),
        }
    }
}

/// Pull-based reader over an upstream body
#[async_trait]
pub trait UpstreamReader: Send {
    /// Next raw chunk, `None` once the upstream has finished
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BridgeError>;

    /// Drop the underlying connection. Idempotent.
    fn release(&mut self);
}
