//! flowbridge core - re-emits upstream model streams as keep-alive SSE
//!
//! An upstream producer (agent token stream or model-pull progress feed) is
//! read chunk by chunk, reassembled into logical units, normalized into a
//! closed event taxonomy and written to the client as SSE frames. A session
//! owns the heartbeat, the upstream reader and the silent-stream fallback.

pub mod backends;
pub mod bridge;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod fallback;
pub mod heartbeat;
pub mod normalize;
pub mod pipeline;
pub mod session;
pub mod sink;
pub mod upstream;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::{BridgeStream, ChatMessage, ChatOutcome, ChatRequest, PullRequest, StreamBridge};
pub use config::BridgeConfig;
pub use encode::{SseEncoder, SSE_RESPONSE_HEADERS};
pub use error::{BridgeError, DecodeError};
pub use normalize::{HeartbeatKind, NormalizedEvent, Payload};
pub use session::{SessionOutcome, SessionReport, SessionState, StreamLifecycleManager};
