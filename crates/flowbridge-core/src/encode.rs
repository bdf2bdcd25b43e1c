//! SSE wire encoding
//!
//! Every frame ends with a blank line. Pre-framed upstream blocks are passed
//! through, everything else is serialized here.

use bytes::Bytes;
use serde::Serialize;
use tracing::warn;

use crate::normalize::{HeartbeatKind, NormalizedEvent, Payload};

/// Response headers for every streaming response
pub const SSE_RESPONSE_HEADERS: [(&str, &str); 3] = [
    ("Content-Type", "text/event-stream; charset=utf-8"),
    ("Cache-Control", "no-cache"),
    ("Connection", "keep-alive"),
];

const CONNECTED_FRAME: &[u8] = b": connected\n\n";
const HEARTBEAT_FRAME: &[u8] = b": heartbeat\n\n";

/// Status payloads of the pull feed
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum StatusFrame<'a> {
    Pulling { progress: u8, detail: &'a str },
    Success,
    Error { message: &'a str },
}

/// Encodes normalized events into SSE frames
pub struct SseEncoder;

impl SseEncoder {
    pub fn encode(event: &NormalizedEvent) -> Bytes {
        match event {
            NormalizedEvent::Heartbeat {
                kind: HeartbeatKind::Connected,
            } => Bytes::from_static(CONNECTED_FRAME),
            NormalizedEvent::Heartbeat {
                kind: HeartbeatKind::Tick,
            } => Bytes::from_static(HEARTBEAT_FRAME),
            NormalizedEvent::Data {
                payload: Payload::PassThrough(block),
            } => Bytes::from(format!("{}\n\n", block)),
            NormalizedEvent::Data {
                payload: Payload::Raw(text),
            } => Bytes::from(Self::wrap_lines(text)),
            NormalizedEvent::Progress { percent, detail } => Self::json_frame(&StatusFrame::Pulling {
                progress: (*percent).min(100),
                detail,
            }),
            NormalizedEvent::Success => Self::json_frame(&StatusFrame::Success),
            NormalizedEvent::Error { message } => Self::json_frame(&StatusFrame::Error { message }),
        }
    }

    /// Prefix every line with `data: ` and terminate the frame
    pub fn wrap_lines(text: &str) -> String {
        let mut frame = text
            .split('\n')
            .map(|line| format!("data: {}", line.strip_suffix('\r').unwrap_or(line)))
            .collect::<Vec<_>>()
            .join("\n");
        frame.push_str("\n\n");
        frame
    }

    /// `data: <json>\n\n`
    pub fn json_frame<T: Serialize>(value: &T) -> Bytes {
        match serde_json::to_string(value) {
            Ok(json) => Bytes::from(format!("data: {}\n\n", json)),
            Err(e) => {
                warn!("Failed to serialize SSE payload: {}", e);
                Bytes::from_static(b"data: {\"status\":\"error\",\"message\":\"serialization failed\"}\n\n")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(event: NormalizedEvent) -> String {
        String::from_utf8(SseEncoder::encode(&event).to_vec()).unwrap()
    }

    #[test]
    fn test_heartbeat_frames() {
        assert_eq!(
            encoded(NormalizedEvent::Heartbeat {
                kind: HeartbeatKind::Connected
            }),
            ": connected\n\n"
        );
        assert_eq!(
            encoded(NormalizedEvent::Heartbeat {
                kind: HeartbeatKind::Tick
            }),
            ": heartbeat\n\n"
        );
    }

    #[test]
    fn test_status_frames() {
        assert_eq!(
            encoded(NormalizedEvent::Progress {
                percent: 45,
                detail: "pulling f1cd752815fc".into()
            }),
            "data: {\"status\":\"pulling\",\"progress\":45,\"detail\":\"pulling f1cd752815fc\"}\n\n"
        );
        assert_eq!(
            encoded(NormalizedEvent::Success),
            "data: {\"status\":\"success\"}\n\n"
        );
        assert_eq!(
            encoded(NormalizedEvent::Error {
                message: "model \"x\" not found".into()
            }),
            "data: {\"status\":\"error\",\"message\":\"model \\\"x\\\" not found\"}\n\n"
        );
    }

    #[test]
    fn test_raw_payload_wrapped_per_line() {
        assert_eq!(
            encoded(NormalizedEvent::Data {
                payload: Payload::Raw("line one\r\nline two\nline three".into())
            }),
            "data: line one\ndata: line two\ndata: line three\n\n"
        );
        assert_eq!(
            encoded(NormalizedEvent::Data {
                payload: Payload::Raw("hello".into())
            }),
            "data: hello\n\n"
        );
    }

    #[test]
    fn test_pass_through_untouched() {
        let block = "event: message\ndata: {\"type\":\"text-delta\"}";
        assert_eq!(
            encoded(NormalizedEvent::Data {
                payload: Payload::PassThrough(block.into())
            }),
            format!("{}\n\n", block)
        );
    }

    #[test]
    fn test_every_frame_ends_with_blank_line() {
        let events = vec![
            NormalizedEvent::Success,
            NormalizedEvent::Error {
                message: String::new(),
            },
            NormalizedEvent::Progress {
                percent: 0,
                detail: String::new(),
            },
            NormalizedEvent::Data {
                payload: Payload::Raw(String::new()),
            },
            NormalizedEvent::Heartbeat {
                kind: HeartbeatKind::Tick,
            },
        ];
        for event in events {
            assert!(encoded(event).ends_with("\n\n"));
        }
    }
}
