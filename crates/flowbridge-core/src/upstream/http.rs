//! reqwest-backed upstream connector

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{RequestDescriptor, UpstreamReader};
use crate::error::BridgeError;

/// Opens upstream connections over HTTP
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpConnector {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: None,
        }
    }

    /// Send `Authorization: Bearer <key>` on every request
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    fn build_request(
        &self,
        descriptor: &RequestDescriptor,
        timeout: Option<Duration>,
    ) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(descriptor.method.clone(), &descriptor.endpoint);

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        request
    }

    /// Send the request and hand back the body as a chunk reader.
    ///
    /// A non-success status is turned into `UpstreamConnection` carrying the
    /// body text; the body is not decoded in that case.
    pub async fn open(&self, descriptor: &RequestDescriptor) -> Result<HttpUpstream, BridgeError> {
        debug!(
            "Opening upstream {} {}",
            descriptor.method, descriptor.endpoint
        );
        let response = self.build_request(descriptor, None).send().await?;
        let response = check_status(response).await?;
        let status = response.status().as_u16();

        Ok(HttpUpstream {
            status,
            stream: Some(response.bytes_stream().boxed()),
        })
    }

    /// Non-streaming call returning the parsed JSON body
    pub async fn call_json(
        &self,
        descriptor: &RequestDescriptor,
        timeout: Option<Duration>,
    ) -> Result<Value, BridgeError> {
        debug!(
            "Synchronous upstream call {} {}",
            descriptor.method, descriptor.endpoint
        );
        let response = self.build_request(descriptor, timeout).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BridgeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body = if text.trim().is_empty() {
        status.canonical_reason().unwrap_or("").to_string()
    } else {
        text
    };
    warn!("Upstream responded {}: {}", status.as_u16(), body);
    Err(BridgeError::UpstreamConnection {
        status: status.as_u16(),
        body,
    })
}

/// An open HTTP response body
pub struct HttpUpstream {
    status: u16,
    stream: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
}

impl HttpUpstream {
    /// HTTP status the upstream answered with
    pub fn status(&self) -> u16 {
        self.status
    }
}

#[async_trait]
impl UpstreamReader for HttpUpstream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, BridgeError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        match stream.next().await {
            Some(Ok(bytes)) => Ok(Some(bytes)),
            Some(Err(e)) => Err(BridgeError::Transport(e)),
            None => Ok(None),
        }
    }

    fn release(&mut self) {
        // Dropping the body stream closes the connection
        if self.stream.take().is_some() {
            debug!("Upstream connection released (status {})", self.status);
        }
    }
}
