//! HTTP routes
//!
//! Errors found before streaming starts are plain JSON responses; after that
//! the session reports them in-band.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use flowbridge_core::{
    BridgeError, BridgeStream, ChatOutcome, ChatRequest, PullRequest, StreamBridge,
    SSE_RESPONSE_HEADERS,
};

pub fn router(bridge: Arc<StreamBridge>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/llm/ollama/pull", post(pull))
        .route("/health", get(health))
        .with_state(bridge)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn chat(State(bridge): State<Arc<StreamBridge>>, body: Bytes) -> Response {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejecting chat request with invalid JSON: {}", e);
            return json_error(StatusCode::BAD_REQUEST, "Invalid JSON body", None);
        }
    };

    match bridge.chat(request).await {
        Ok(ChatOutcome::Debug(result)) => Json(result).into_response(),
        Ok(ChatOutcome::Stream(stream)) => sse_response(stream),
        Err(e) => error_response(&e),
    }
}

async fn pull(State(bridge): State<Arc<StreamBridge>>, body: Bytes) -> Response {
    // An unreadable body behaves like an empty one
    let request = serde_json::from_slice::<Value>(&body)
        .map(|value| PullRequest::from_value(&value))
        .unwrap_or_default();

    match bridge.pull(request).await {
        Ok(stream) => sse_response(stream),
        Err(e) => error_response(&e),
    }
}

fn sse_response(stream: BridgeStream) -> Response {
    let BridgeStream {
        session_id, frames, ..
    } = stream;
    info!("Streaming session {}", session_id);

    let body = Body::from_stream(ReceiverStream::new(frames).map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    for (name, value) in SSE_RESPONSE_HEADERS {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }
    response
}

fn error_response(error: &BridgeError) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warn!("Request failed before streaming ({}): {}", status, error);

    match error {
        BridgeError::Validation(message) => json_error(status, message, None),
        BridgeError::InvalidMessages(detail) => {
            json_error(status, "Invalid messages payload", Some(detail))
        }
        BridgeError::UpstreamConnection { .. } | BridgeError::Transport(_) => {
            json_error(status, "Failed to start stream", Some(&error.to_string()))
        }
        BridgeError::DebugCall(detail) => json_error(status, "generateText failed", Some(detail)),
        other => json_error(status, &other.to_string(), None),
    }
}

fn json_error(status: StatusCode, error: &str, detail: Option<&str>) -> Response {
    let body = match detail {
        Some(detail) => json!({ "error": error, "detail": detail }),
        None => json!({ "error": error }),
    };
    (status, Json(body)).into_response()
}
