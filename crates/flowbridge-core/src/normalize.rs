//! Event normalization
//!
//! Maps decoded units onto the closed event taxonomy that crosses into the
//! encoder: data, progress, success, error and heartbeat.

use serde::Deserialize;
use serde_json::Value;

use crate::decode::{classify_unit, LogicalUnit, UnitKind};
use crate::error::DecodeError;

/// The only type crossing the normalizer -> encoder boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// Substantive content for the client
    Data { payload: Payload },
    /// Download progress, `percent` always in 0..=100
    Progress { percent: u8, detail: String },
    /// Upstream reported completion
    Success,
    /// Upstream reported a failure
    Error { message: String },
    /// Keep-alive comment frame
    Heartbeat { kind: HeartbeatKind },
}

impl NormalizedEvent {
    pub fn is_data(&self) -> bool {
        matches!(self, NormalizedEvent::Data { .. })
    }
}

/// Body of a data event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Already SSE-shaped, forwarded as is
    PassThrough(String),
    /// Plain text to be wrapped in `data:` lines
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatKind {
    /// The single frame written when the session opens
    Connected,
    /// Periodic keep-alive
    Tick,
}

/// One record of a model-pull progress feed
#[derive(Debug, Deserialize)]
struct PullRecord {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    completed: Option<f64>,
    #[serde(default)]
    total: Option<f64>,
}

/// Normalizes newline-delimited JSON progress records
#[derive(Debug, Default)]
pub struct ProgressNormalizer;

impl ProgressNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, unit: &LogicalUnit) -> Result<NormalizedEvent, DecodeError> {
        let record: PullRecord =
            serde_json::from_str(unit.as_str()).map_err(|source| DecodeError {
                line: unit.as_str().to_string(),
                source,
            })?;

        if let Some(error) = record.error.filter(is_set) {
            return Ok(NormalizedEvent::Error {
                message: value_to_message(&error),
            });
        }

        if record.status.as_deref() == Some("success") {
            return Ok(NormalizedEvent::Success);
        }

        Ok(NormalizedEvent::Progress {
            percent: percent(record.completed, record.total),
            detail: record.status.unwrap_or_default(),
        })
    }
}

/// An `error` field of `null`, `false` or `""` does not signal failure
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// `round(completed / total * 100)` clamped to 0..=100, or 0 without a total
pub fn percent(completed: Option<f64>, total: Option<f64>) -> u8 {
    match (completed, total) {
        (Some(completed), Some(total)) if total > 0.0 => {
            let pct = (completed / total * 100.0).round();
            if pct.is_nan() {
                0
            } else {
                pct.clamp(0.0, 100.0) as u8
            }
        }
        _ => 0,
    }
}

/// Normalizes message-stream units from token streams
#[derive(Debug, Default)]
pub struct MessageNormalizer;

impl MessageNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// `None` for an empty unit
    pub fn normalize(&self, unit: LogicalUnit) -> Option<NormalizedEvent> {
        if unit.as_str().trim().is_empty() {
            return None;
        }

        match classify_unit(&unit) {
            UnitKind::PassThrough => {
                if let Some(message) = sse_error_message(unit.as_str()) {
                    return Some(NormalizedEvent::Error { message });
                }
                Some(NormalizedEvent::Data {
                    payload: Payload::PassThrough(unit.into_string()),
                })
            }
            UnitKind::RawPayload => {
                if let Ok(json) = serde_json::from_str::<Value>(unit.as_str()) {
                    if let Some(message) = json_error_message(&json) {
                        return Some(NormalizedEvent::Error { message });
                    }
                }
                Some(NormalizedEvent::Data {
                    payload: Payload::Raw(unit.into_string()),
                })
            }
        }
    }
}

/// Error text carried by an SSE-shaped block, if it is an error signal
fn sse_error_message(block: &str) -> Option<String> {
    let mut is_error_event = false;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if let Some(event) = line.strip_prefix("event:") {
            is_error_event |= event.trim() == "error";
        } else if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.strip_prefix(' ').unwrap_or(data));
        }
    }

    let data = data_lines.join("\n");
    let json = serde_json::from_str::<Value>(&data).ok();
    if let Some(message) = json.as_ref().and_then(json_error_message) {
        return Some(message);
    }

    if is_error_event {
        let message = if data.trim().is_empty() {
            "Upstream reported an error".to_string()
        } else {
            data
        };
        return Some(message);
    }

    None
}

/// Error text of a JSON error record (`{"type":"error",...}` or `{"error":...}`)
fn json_error_message(json: &Value) -> Option<String> {
    let obj = json.as_object()?;

    if obj.get("type").and_then(|t| t.as_str()) == Some("error") {
        let message = ["errorText", "error", "message"]
            .iter()
            .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
            .map(value_to_message)
            .unwrap_or_else(|| "Upstream reported an error".to_string());
        return Some(message);
    }

    obj.get("error")
        .filter(|e| !e.is_null())
        .map(value_to_message)
}

fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
