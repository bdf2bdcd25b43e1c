//! Error taxonomy for the bridge
//!
//! Errors raised before the first byte reaches the client become ordinary
//! HTTP responses; anything later can only be reported in-band.

use thiserror::Error;

/// Errors surfaced by the bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A required request field is missing or blank
    #[error("{0}")]
    Validation(String),

    /// The `messages` array could not be converted
    #[error("Invalid messages payload: {0}")]
    InvalidMessages(String),

    /// The upstream answered with a non-success status
    #[error("Upstream error {status}: {body}")]
    UpstreamConnection { status: u16, body: String },

    /// The upstream connection failed or broke mid-body
    #[error("Upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The synchronous fallback call failed
    #[error("Fallback call failed: {0}")]
    Fallback(String),

    /// The non-streaming debug call failed
    #[error("Debug call failed: {0}")]
    DebugCall(String),

    /// The client end of the frame channel is gone
    #[error("Client channel closed")]
    ChannelClosed,

    /// The session was cancelled while waiting
    #[error("Session cancelled")]
    Cancelled,
}

impl BridgeError {
    /// HTTP status to use when this error is reported before streaming began
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::Validation(_) | BridgeError::InvalidMessages(_) => 400,
            BridgeError::UpstreamConnection { .. } | BridgeError::Transport(_) => 502,
            BridgeError::Fallback(_) | BridgeError::DebugCall(_) => 500,
            BridgeError::ChannelClosed | BridgeError::Cancelled => 499,
        }
    }

    /// Whether this error means the client went away rather than a failure
    pub fn is_disconnect(&self) -> bool {
        matches!(self, BridgeError::ChannelClosed | BridgeError::Cancelled)
    }
}

/// A single upstream record that could not be decoded.
///
/// Never fatal: the record is logged and skipped.
#[derive(Debug, Error)]
#[error("Malformed record ({source}): {line}")]
pub struct DecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
}
