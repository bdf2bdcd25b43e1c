//! Per-connection session state
//!
//! Owned exclusively by the lifecycle manager driving it.

use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::heartbeat::HeartbeatHandle;
use crate::upstream::{RequestDescriptor, UpstreamReader};

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Open,
    Draining,
    Closed,
}

/// Runtime state of one client connection
pub struct StreamSession {
    pub id: Uuid,
    pub descriptor: RequestDescriptor,
    pub state: SessionState,
    /// Whether at least one data event reached the client
    pub saw_data: bool,
    /// Frames handed to the client channel, heartbeats excluded
    pub frames_sent: usize,
    pub started: Instant,
    pub(crate) heartbeat: Option<HeartbeatHandle>,
    pub(crate) reader: Option<Box<dyn UpstreamReader>>,
}

impl StreamSession {
    pub fn new(descriptor: RequestDescriptor, reader: Box<dyn UpstreamReader>) -> Self {
        Self {
            id: Uuid::new_v4(),
            descriptor,
            state: SessionState::Init,
            saw_data: false,
            frames_sent: 0,
            started: Instant::now(),
            heartbeat: None,
            reader: Some(reader),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Whether the upstream reader is still held
    pub fn holds_reader(&self) -> bool {
        self.reader.is_some()
    }
}
